use crate::backend::BackendClient;
use crate::camera::{CameraContext, CameraStatus};
use crate::config::FleetSettings;
use crate::metrics::{CameraMetrics, FleetSummary};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Report `status` for a camera, updating its local status only on success.
///
/// Failures are counted and logged; callers retry on their own schedule.
pub async fn report_status(
    backend: &dyn BackendClient,
    ctx: &CameraContext,
    metrics: &CameraMetrics,
    status: CameraStatus,
) -> bool {
    match backend.update_camera_status(&ctx.id, status).await {
        Ok(()) => {
            metrics.set_status(status);
            info!(camera_id = %ctx.id, camera_name = %ctx.name, "Camera status -> {}", status);
            true
        }
        Err(e) => {
            CameraMetrics::incr(&metrics.errors);
            warn!(
                camera_id = %ctx.id,
                camera_name = %ctx.name,
                "Failed to report status {}: {}", status, e
            );
            false
        }
    }
}

/// A camera as seen by the health monitor
#[derive(Clone)]
pub struct MonitoredCamera {
    pub ctx: CameraContext,
    pub metrics: Arc<CameraMetrics>,
    pub running: Arc<AtomicBool>,
}

/// Periodically reconciles each camera's reported status with frame freshness
pub struct HealthMonitor {
    backend: Arc<dyn BackendClient>,
    cameras: Vec<MonitoredCamera>,
    check_interval: Duration,
    stale_after: Duration,
    summary_every_ticks: u32,
}

impl HealthMonitor {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        cameras: Vec<MonitoredCamera>,
        settings: &FleetSettings,
    ) -> Self {
        Self {
            backend,
            cameras,
            check_interval: settings.health_check_interval(),
            stale_after: settings.stale_after(),
            summary_every_ticks: settings.metrics_log_every_ticks,
        }
    }

    /// Run one reconciliation pass as of `now`. Returns the number of status
    /// updates that were attempted.
    pub async fn reconcile_at(&self, now: Instant) -> usize {
        let mut attempted = 0;

        for camera in &self.cameras {
            let metrics = &camera.metrics;
            let status = metrics.status();
            let since_last_frame = metrics
                .last_frame_time()
                .map(|t| now.saturating_duration_since(t));

            let stale = metrics.frames_processed() > 0
                && since_last_frame.is_some_and(|age| age > self.stale_after);

            let target = if stale {
                if status == CameraStatus::Offline {
                    continue;
                }
                warn!(
                    camera_id = %camera.ctx.id,
                    camera_name = %camera.ctx.name,
                    "Camera appears offline (no frames for {:.1}s)",
                    since_last_frame.unwrap_or_default().as_secs_f64()
                );
                CameraStatus::Offline
            } else if camera.running.load(Ordering::Relaxed) && status != CameraStatus::Online {
                CameraStatus::Online
            } else {
                continue;
            };

            attempted += 1;
            report_status(self.backend.as_ref(), &camera.ctx, metrics, target).await;
        }

        attempted
    }

    pub fn summary(&self) -> FleetSummary {
        FleetSummary::from_snapshots(
            self.cameras
                .iter()
                .map(|c| c.metrics.snapshot(&c.ctx))
                .collect(),
        )
    }

    /// Check every interval until cancelled
    pub async fn run(self, token: CancellationToken) {
        info!(
            "Health monitor started ({} cameras, every {:?}, stale after {:?})",
            self.cameras.len(),
            self.check_interval,
            self.stale_after
        );

        let mut ticker = interval_at(
            tokio::time::Instant::now() + self.check_interval,
            self.check_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            ticks += 1;
            let updates = self
                .reconcile_at(Instant::now())
                .instrument(tracing::debug_span!("health_check", tick = ticks))
                .await;
            debug!("Health check #{} sent {} status updates", ticks, updates);

            if self.summary_every_ticks > 0 && ticks % self.summary_every_ticks as u64 == 0 {
                let summary = self.summary();
                info!(
                    "Metrics: {}/{} cameras online, {} frames, {} detections, {} events, {} errors",
                    summary.online_cameras,
                    summary.total_cameras,
                    summary.total_frames_processed,
                    summary.total_detections,
                    summary.total_events_logged,
                    summary.total_errors
                );
            }
        }

        info!("Health monitor stopped");
    }
}
