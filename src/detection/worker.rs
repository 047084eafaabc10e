use super::policy::{DetectionFilter, DetectionPolicy, Verdict};
use super::snapshot::SnapshotStore;
use crate::backend::BackendClient;
use crate::camera::CameraContext;
use crate::config::DetectionConfig;
use crate::detector::{Detection, ObjectDetector};
use crate::error::DetectorError;
use crate::events::DetectionEvent;
use crate::frame::{BBox, QueuedFrame};
use crate::metrics::CameraMetrics;
use crate::ring_buffer::RingBuffer;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// Sleeps used by the detection loop
#[derive(Debug, Clone, Copy)]
pub struct WorkerTimings {
    /// Wait when the queue is empty
    pub idle: Duration,
    /// Pause after each processed frame
    pub after_item: Duration,
    /// Pause after a detector failure
    pub after_error: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            idle: Duration::from_millis(100),
            after_item: Duration::from_millis(50),
            after_error: Duration::from_secs(1),
        }
    }
}

/// Everything a detection worker shares with the rest of the fleet
#[derive(Clone)]
pub struct DetectionDeps {
    pub detector: Arc<dyn ObjectDetector>,
    pub backend: Arc<dyn BackendClient>,
    pub snapshots: Arc<SnapshotStore>,
}

/// Per-camera consumer: samples queued frames, runs the detector and emits
/// deduplicated events
pub struct DetectionWorker {
    ctx: CameraContext,
    location: String,
    queue: Arc<RingBuffer<QueuedFrame>>,
    deps: DetectionDeps,
    metrics: Arc<CameraMetrics>,
    filter: DetectionFilter,
    frame_stride: u64,
    dequeued: u64,
    timings: WorkerTimings,
}

impl DetectionWorker {
    pub fn new(
        ctx: CameraContext,
        location: String,
        queue: Arc<RingBuffer<QueuedFrame>>,
        deps: DetectionDeps,
        metrics: Arc<CameraMetrics>,
        config: &DetectionConfig,
    ) -> Self {
        Self {
            ctx,
            location,
            queue,
            deps,
            metrics,
            filter: DetectionFilter::new(
                DetectionPolicy::from_config(config),
                config.cooldown_table_capacity,
            ),
            frame_stride: config.frame_stride.max(1) as u64,
            dequeued: 0,
            timings: WorkerTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: WorkerTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Drain the queue until `token` is cancelled
    pub async fn run(mut self, token: CancellationToken) {
        info!(
            "Detection worker started (stride {}, detector {})",
            self.frame_stride,
            self.deps.detector.name()
        );

        while !token.is_cancelled() {
            let Some(frame) = self.queue.try_pop() else {
                if !pause(&token, self.timings.idle).await {
                    break;
                }
                continue;
            };

            self.dequeued += 1;
            if self.dequeued % self.frame_stride != 0 {
                CameraMetrics::incr(&self.metrics.frames_skipped);
                tokio::task::yield_now().await;
                continue;
            }

            // a panicking detector costs one frame, not the worker
            let outcome = AssertUnwindSafe(self.process_frame(&frame, Instant::now()))
                .catch_unwind()
                .await;
            let delay = match outcome {
                Ok(Ok(_)) => self.timings.after_item,
                Ok(Err(e)) => {
                    CameraMetrics::incr(&self.metrics.errors);
                    warn!("Detection failed on frame {}: {}", frame.sequence, e);
                    self.timings.after_error
                }
                Err(panic) => {
                    CameraMetrics::incr(&self.metrics.errors);
                    error!(
                        "Detection panicked on frame {}: {}",
                        frame.sequence,
                        panic_message(panic.as_ref())
                    );
                    self.timings.after_error
                }
            };
            drop(frame);

            if !pause(&token, delay).await {
                break;
            }
        }

        let discarded = self.queue.clear();
        info!(
            "Detection worker stopped ({} frames dequeued, {} discarded)",
            self.dequeued, discarded
        );
    }

    /// Run detection on one frame as if it were processed at `now`.
    ///
    /// Returns the number of events emitted.
    pub async fn process_frame(
        &mut self,
        frame: &QueuedFrame,
        now: Instant,
    ) -> Result<usize, DetectorError> {
        let detections = self
            .deps
            .detector
            .detect(&self.ctx.id, &frame.normalized)
            .await?;
        trace!(
            "Frame {} ({} ms old) produced {} raw detections",
            frame.sequence,
            frame.age_ms(),
            detections.len()
        );

        let mut emitted = 0;
        for detection in &detections {
            let verdict = self.filter.evaluate(detection, &frame.params, now);
            if verdict.is_candidate() {
                CameraMetrics::incr(&self.metrics.detections_made);
            }

            match verdict {
                Verdict::Emit { source_bbox } => {
                    self.emit(frame, detection, source_bbox).await;
                    emitted += 1;
                }
                Verdict::Rejected(reason) => {
                    trace!(
                        "Dropped detection (track {:?}, conf {:.2}): {:?}",
                        detection.track_id,
                        detection.confidence,
                        reason
                    );
                }
            }
        }

        Ok(emitted)
    }

    async fn emit(&self, frame: &QueuedFrame, detection: &Detection, source_bbox: BBox) {
        let occurred_at = Utc::now();

        let image_path = match self
            .deps
            .snapshots
            .save(
                &self.ctx.id,
                detection.track_id,
                &frame.original,
                &source_bbox,
                occurred_at,
            )
            .await
        {
            Ok(name) => Some(name),
            Err(e) => {
                CameraMetrics::incr(&self.metrics.snapshots_failed);
                warn!("Snapshot not saved, emitting event without image: {}", e);
                None
            }
        };

        let mut builder = DetectionEvent::builder(&self.ctx.id, &self.ctx.name)
            .occurred_at(occurred_at)
            .track_id(detection.track_id)
            .confidence(detection.confidence)
            .bbox(source_bbox)
            .image_path(image_path)
            .location(&self.location)
            .extra("class_id", serde_json::json!(detection.class_id))
            .extra("frame_sequence", serde_json::json!(frame.sequence));
        if let Some(track_id) = detection.track_id {
            builder = builder.extra("track_id", serde_json::json!(track_id));
        }
        let event = builder.build();

        match self.deps.backend.submit_event(&event).await {
            Ok(()) => {
                CameraMetrics::incr(&self.metrics.events_logged);
                info!(
                    "Logged detection: person {} conf {:.2} bbox [{:.0}, {:.0}, {:.0}, {:.0}]",
                    event.track_or_person_id,
                    event.confidence,
                    source_bbox.x1,
                    source_bbox.y1,
                    source_bbox.x2,
                    source_bbox.y2
                );
            }
            Err(e) => {
                CameraMetrics::incr(&self.metrics.errors);
                warn!("Failed to submit detection event: {}", e);
            }
        }
    }
}

/// Sleep for `duration` unless cancelled first; returns false on cancellation
async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for DetectionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionWorker")
            .field("camera", &self.ctx.id)
            .field("frame_stride", &self.frame_stride)
            .field("dequeued", &self.dequeued)
            .finish()
    }
}
