use super::ComponentState;
use crate::acquisition::{AcquisitionHandle, AcquisitionWorker};
use crate::backend::CameraRecord;
use crate::camera::CameraContext;
use crate::config::FleetConfig;
use crate::detection::{DetectionDeps, DetectionWorker};
use crate::error::{FleetError, Result};
use crate::frame::QueuedFrame;
use crate::health::MonitoredCamera;
use crate::metrics::CameraMetrics;
use crate::recovery::ReconnectBackoff;
use crate::ring_buffer::{RingBuffer, RingBufferBuilder};
use crate::source::{CaptureHints, FrameSourceFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// Shared collaborators handed to every pipeline
#[derive(Clone)]
pub struct PipelineDeps {
    pub sources: Arc<dyn FrameSourceFactory>,
    pub detection: DetectionDeps,
}

/// Acquisition thread plus detection task for one camera
pub struct CameraPipeline {
    ctx: CameraContext,
    record: CameraRecord,
    config: FleetConfig,
    metrics: Arc<CameraMetrics>,
    running: Arc<AtomicBool>,
    queue: Arc<RingBuffer<QueuedFrame>>,
    acquisition: Option<AcquisitionHandle>,
    detection: Option<JoinHandle<()>>,
    token: Option<CancellationToken>,
}

impl CameraPipeline {
    pub fn new(record: CameraRecord, config: &FleetConfig) -> Result<Self> {
        let queue = RingBufferBuilder::new()
            .capacity(config.capture.queue_capacity)
            .build()?;

        Ok(Self {
            ctx: CameraContext::new(&record.id, &record.name),
            record,
            config: config.clone(),
            metrics: Arc::new(CameraMetrics::new()),
            running: Arc::new(AtomicBool::new(false)),
            queue: Arc::new(queue),
            acquisition: None,
            detection: None,
            token: None,
        })
    }

    pub fn context(&self) -> &CameraContext {
        &self.ctx
    }

    pub fn record(&self) -> &CameraRecord {
        &self.record
    }

    pub fn metrics(&self) -> &Arc<CameraMetrics> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn monitored(&self) -> MonitoredCamera {
        MonitoredCamera {
            ctx: self.ctx.clone(),
            metrics: Arc::clone(&self.metrics),
            running: Arc::clone(&self.running),
        }
    }

    /// Spawn the grabber thread and the detection task
    pub fn start(&mut self, deps: &PipelineDeps, parent: &CancellationToken) -> Result<()> {
        if self.is_running() {
            warn!(camera_id = %self.ctx.id, "Pipeline already running");
            return Ok(());
        }

        let token = parent.child_token();
        let span = self.ctx.span();

        let acquisition = AcquisitionWorker::new(
            self.ctx.clone(),
            self.record.source_uri.clone(),
            CaptureHints::from_config(&self.config.capture),
            Arc::clone(&deps.sources),
            Arc::clone(&self.queue),
            Arc::clone(&self.metrics),
            (
                self.config.detection.canvas_width,
                self.config.detection.canvas_height,
            ),
            ReconnectBackoff::new(
                self.config.capture.reconnect_base_delay(),
                self.config.capture.reconnect_max_delay(),
            ),
        )
        .spawn()
        .map_err(|e| FleetError::component(format!("grabber-{}", self.ctx.id), e.to_string()))?;

        let worker = DetectionWorker::new(
            self.ctx.clone(),
            self.record.event_location(),
            Arc::clone(&self.queue),
            deps.detection.clone(),
            Arc::clone(&self.metrics),
            &self.config.detection,
        );
        let detection = tokio::spawn(worker.run(token.clone()).instrument(span.clone()));

        self.acquisition = Some(acquisition);
        self.detection = Some(detection);
        self.token = Some(token);
        self.running.store(true, Ordering::Relaxed);

        span.in_scope(|| info!("Pipeline started for {}", self.record.source_uri));
        Ok(())
    }

    /// Signal both halves to stop without waiting.
    ///
    /// Returns `None` if the pipeline was never started or is already
    /// stopping; otherwise the returned [`PipelineStop`] joins the halves.
    pub fn begin_stop(&mut self) -> Option<PipelineStop> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(token) = self.token.take() {
            token.cancel();
        }

        let mut acquisition = self.acquisition.take();
        if let Some(acquisition) = acquisition.as_mut() {
            acquisition.signal_stop();
        }
        let detection = self.detection.take();

        if acquisition.is_none() && detection.is_none() {
            return None;
        }
        Some(PipelineStop {
            ctx: self.ctx.clone(),
            acquisition,
            detection,
        })
    }
}

/// The signalled halves of a stopping pipeline, owned so several cameras can
/// be joined concurrently
pub struct PipelineStop {
    ctx: CameraContext,
    acquisition: Option<AcquisitionHandle>,
    detection: Option<JoinHandle<()>>,
}

impl PipelineStop {
    pub fn context(&self) -> &CameraContext {
        &self.ctx
    }

    /// Wait at most `join_timeout` for each half to exit
    pub async fn join(mut self, join_timeout: Duration) -> ComponentState {
        let mut state = ComponentState::Stopped;

        if let Some(mut acquisition) = self.acquisition.take() {
            if !acquisition.stop(join_timeout).await {
                state = ComponentState::Failed;
            }
        }

        if let Some(mut detection) = self.detection.take() {
            match tokio::time::timeout(join_timeout, &mut detection).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    error!(camera_id = %self.ctx.id, "Detection task panicked: {}", e);
                    state = ComponentState::Failed;
                }
                Ok(Err(e)) => {
                    warn!(camera_id = %self.ctx.id, "Detection task ended abnormally: {}", e);
                }
                Err(_) => {
                    warn!(
                        camera_id = %self.ctx.id,
                        "Detection task did not stop within {:?}, aborting", join_timeout
                    );
                    detection.abort();
                    state = ComponentState::Failed;
                }
            }
        }

        state
    }
}
