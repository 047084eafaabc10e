use super::startup::{camera_key, HEALTH_MONITOR};
use super::{ComponentState, FleetManager};
use crate::camera::CameraStatus;
use crate::error::Result;
use crate::health::report_status;
use futures::future::join_all;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl FleetManager {
    /// Stop every pipeline and the health monitor, reporting cameras offline.
    ///
    /// All pipelines are signalled first and joined concurrently, each bounded
    /// by the capture join timeout. Cameras still stopping when the fleet
    /// shutdown timeout expires are counted as failed but still reported
    /// offline. Returns the number of pipelines that failed to stop cleanly.
    pub async fn stop_all(&mut self) -> usize {
        info!("Stopping all cameras");
        self.cancellation_token.cancel();

        if let Some(health_task) = self.health_task.take() {
            match timeout(Duration::from_secs(5), health_task).await {
                Ok(Ok(())) => {
                    self.set_component_state(HEALTH_MONITOR, ComponentState::Stopped)
                        .await
                }
                _ => {
                    warn!("Health monitor did not stop cleanly");
                    self.set_component_state(HEALTH_MONITOR, ComponentState::Failed)
                        .await
                }
            }
        }

        let join_timeout = self.config.capture.join_timeout();
        let mut joins = JoinSet::new();
        let mut stopping = Vec::new();

        for index in 0..self.pipelines.len() {
            let Some(stop) = self.pipelines[index].begin_stop() else {
                continue;
            };
            let key = camera_key(&stop.context().id);
            self.set_component_state(&key, ComponentState::Stopping).await;

            stopping.push(index);
            joins.spawn(async move { (index, stop.join(join_timeout).await) });
        }

        let mut states: HashMap<usize, ComponentState> = HashMap::new();
        let fleet_timeout = self.config.fleet.shutdown_timeout();
        let collected = timeout(fleet_timeout, async {
            while let Some(joined) = joins.join_next().await {
                match joined {
                    Ok((index, state)) => {
                        states.insert(index, state);
                    }
                    Err(e) => error!("Pipeline stop task failed: {}", e),
                }
            }
        })
        .await;
        if collected.is_err() {
            error!(
                "{} cameras still stopping after {:?}",
                stopping.len() - states.len(),
                fleet_timeout
            );
            joins.abort_all();
        }

        let backend = self.backend.as_ref();
        join_all(stopping.iter().map(|&index| {
            let pipeline = &self.pipelines[index];
            report_status(
                backend,
                pipeline.context(),
                pipeline.metrics(),
                CameraStatus::Offline,
            )
        }))
        .await;

        let mut failures = 0;
        for index in stopping {
            let state = states
                .remove(&index)
                .unwrap_or(ComponentState::Failed);
            if state == ComponentState::Failed {
                failures += 1;
            }
            let key = camera_key(&self.pipelines[index].context().id);
            self.set_component_state(&key, state).await;
        }

        info!("All cameras stopped");
        failures
    }

    /// Graceful shutdown: stop everything and log the final metrics summary
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let failures = self.stop_all().await;
        let exit_code = if failures == 0 {
            0
        } else {
            error!("{} camera pipelines failed to stop cleanly", failures);
            1
        };

        let summary = self.summary();
        info!("Final metrics: {}", serde_json::to_string_pretty(&summary)?);

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
