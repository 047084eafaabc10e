use crate::camera::{CameraContext, CameraStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one camera, shared by its grabber thread, detection task and
/// the health monitor
#[derive(Debug)]
pub struct CameraMetrics {
    pub frames_processed: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub detections_made: AtomicU64,
    pub events_logged: AtomicU64,
    pub connection_attempts: AtomicU64,
    pub successful_connections: AtomicU64,
    pub errors: AtomicU64,
    pub snapshots_failed: AtomicU64,
    last_frame_time: Mutex<Option<Instant>>,
    status: Mutex<CameraStatus>,
    started_at: Instant,
}

impl CameraMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            detections_made: AtomicU64::new(0),
            events_logged: AtomicU64::new(0),
            connection_attempts: AtomicU64::new(0),
            successful_connections: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            snapshots_failed: AtomicU64::new(0),
            last_frame_time: Mutex::new(None),
            status: Mutex::new(CameraStatus::Starting),
            started_at: Instant::now(),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully read frame
    pub fn record_frame(&self, at: Instant) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        *self.last_frame_time.lock() = Some(at);
    }

    pub fn last_frame_time(&self) -> Option<Instant> {
        *self.last_frame_time.lock()
    }

    pub fn status(&self) -> CameraStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: CameraStatus) {
        *self.status.lock() = status;
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn events_logged(&self) -> u64 {
        self.events_logged.load(Ordering::Relaxed)
    }

    /// Approximate frames per second since the metrics were created
    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.frames_processed() as f64 / elapsed
    }

    pub fn snapshot(&self, ctx: &CameraContext) -> MetricsSnapshot {
        MetricsSnapshot {
            camera_id: ctx.id.clone(),
            camera_name: ctx.name.clone(),
            status: self.status(),
            frames_processed: self.frames_processed(),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            detections_made: self.detections_made.load(Ordering::Relaxed),
            events_logged: self.events_logged(),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            successful_connections: self.successful_connections.load(Ordering::Relaxed),
            errors: self.errors(),
            snapshots_failed: self.snapshots_failed.load(Ordering::Relaxed),
            fps: (self.fps() * 100.0).round() / 100.0,
            seconds_since_last_frame: self.last_frame_time().map(|t| t.elapsed().as_secs_f64()),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for CameraMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a camera's metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub camera_id: String,
    pub camera_name: String,
    pub status: CameraStatus,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub frames_skipped: u64,
    pub detections_made: u64,
    pub events_logged: u64,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub errors: u64,
    pub snapshots_failed: u64,
    pub fps: f64,
    pub seconds_since_last_frame: Option<f64>,
    pub uptime: Duration,
}

/// Aggregate metrics across the fleet. Any camera not online counts as offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total_cameras: usize,
    pub online_cameras: usize,
    pub offline_cameras: usize,
    pub total_frames_processed: u64,
    pub total_detections: u64,
    pub total_events_logged: u64,
    pub total_errors: u64,
    pub cameras: Vec<MetricsSnapshot>,
}

impl FleetSummary {
    pub fn from_snapshots(cameras: Vec<MetricsSnapshot>) -> Self {
        Self {
            total_cameras: cameras.len(),
            online_cameras: cameras
                .iter()
                .filter(|c| c.status == CameraStatus::Online)
                .count(),
            offline_cameras: cameras
                .iter()
                .filter(|c| c.status != CameraStatus::Online)
                .count(),
            total_frames_processed: cameras.iter().map(|c| c.frames_processed).sum(),
            total_detections: cameras.iter().map(|c| c.detections_made).sum(),
            total_events_logged: cameras.iter().map(|c| c.events_logged).sum(),
            total_errors: cameras.iter().map(|c| c.errors).sum(),
            cameras,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_frame() {
        let metrics = CameraMetrics::new();
        assert!(metrics.last_frame_time().is_none());

        let now = Instant::now();
        metrics.record_frame(now);
        metrics.record_frame(now);
        assert_eq!(metrics.frames_processed(), 2);
        assert_eq!(metrics.last_frame_time(), Some(now));
    }

    #[test]
    fn test_fleet_summary_totals() {
        let a = CameraMetrics::new();
        a.record_frame(Instant::now());
        CameraMetrics::incr(&a.events_logged);
        a.set_status(CameraStatus::Online);

        let b = CameraMetrics::new();
        CameraMetrics::incr(&b.errors);
        CameraMetrics::incr(&b.detections_made);
        b.set_status(CameraStatus::Offline);

        let summary = FleetSummary::from_snapshots(vec![
            a.snapshot(&CameraContext::new("a", "A")),
            b.snapshot(&CameraContext::new("b", "B")),
        ]);

        assert_eq!(summary.total_cameras, 2);
        assert_eq!(summary.online_cameras, 1);
        assert_eq!(summary.offline_cameras, 1);
        assert_eq!(summary.total_frames_processed, 1);
        assert_eq!(summary.total_detections, 1);
        assert_eq!(summary.total_events_logged, 1);
        assert_eq!(summary.total_errors, 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["cameras"][0]["camera_id"], "a");
        assert_eq!(json["cameras"][1]["status"], "offline");
    }
}
