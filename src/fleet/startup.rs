use super::{ComponentState, FleetManager};
use crate::camera::CameraStatus;
use crate::error::Result;
use crate::health::{report_status, HealthMonitor};
use tracing::{error, info, warn};

impl FleetManager {
    /// Start every pipeline and the health monitor
    pub async fn start_all(&mut self) -> Result<()> {
        info!("Starting all camera pipelines");

        if let Err(e) = self.snapshots.ensure_directory().await {
            warn!("Snapshot directory unavailable, events will carry no image: {}", e);
        }

        let mut started = 0;
        for index in 0..self.pipelines.len() {
            let key = camera_key(&self.pipelines[index].context().id);
            self.set_component_state(&key, ComponentState::Starting).await;

            let pipeline = &mut self.pipelines[index];
            match pipeline.start(&self.deps, &self.cancellation_token) {
                Ok(()) => {
                    report_status(
                        self.backend.as_ref(),
                        pipeline.context(),
                        pipeline.metrics(),
                        CameraStatus::Online,
                    )
                    .await;
                    self.set_component_state(&key, ComponentState::Running).await;
                    started += 1;
                }
                Err(e) => {
                    error!(camera_id = %pipeline.context().id, "Failed to start pipeline: {}", e);
                    self.set_component_state(&key, ComponentState::Failed).await;
                }
            }
        }

        self.start_health_monitor().await;

        info!("{}/{} camera pipelines running", started, self.pipelines.len());
        Ok(())
    }

    async fn start_health_monitor(&mut self) {
        if self.health_task.is_some() {
            return;
        }

        let monitor = HealthMonitor::new(
            self.backend.clone(),
            self.pipelines.iter().map(|p| p.monitored()).collect(),
            &self.config.fleet,
        );
        let token = self.cancellation_token.child_token();
        self.health_task = Some(tokio::spawn(monitor.run(token)));
        self.set_component_state(HEALTH_MONITOR, ComponentState::Running)
            .await;
    }
}

pub(super) const HEALTH_MONITOR: &str = "health_monitor";

pub(super) fn camera_key(camera_id: &str) -> String {
    format!("camera:{}", camera_id)
}
