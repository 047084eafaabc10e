use crate::camera::CameraContext;
use crate::error::{FleetError, SourceError};
use crate::frame::QueuedFrame;
use crate::metrics::CameraMetrics;
use crate::normalize::FrameNormalizer;
use crate::recovery::ReconnectBackoff;
use crate::ring_buffer::RingBuffer;
use crate::source::{CaptureHints, FrameSourceFactory, FrameStream};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Lifecycle of a grabber thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Connecting,
    Streaming,
    Stopped,
}

/// Why a streaming session ended
enum SessionEnd {
    Stopped,
    ReadFailed(SourceError),
    Faulted(SourceError),
}

/// Per-camera producer pulling frames on a dedicated OS thread
pub struct AcquisitionWorker {
    ctx: CameraContext,
    uri: String,
    hints: CaptureHints,
    factory: Arc<dyn FrameSourceFactory>,
    queue: Arc<RingBuffer<QueuedFrame>>,
    metrics: Arc<CameraMetrics>,
    normalizer: FrameNormalizer,
    backoff: ReconnectBackoff,
    state: Arc<Mutex<AcquisitionState>>,
    sequence: u64,
}

impl AcquisitionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: CameraContext,
        uri: String,
        hints: CaptureHints,
        factory: Arc<dyn FrameSourceFactory>,
        queue: Arc<RingBuffer<QueuedFrame>>,
        metrics: Arc<CameraMetrics>,
        canvas: (u32, u32),
        backoff: ReconnectBackoff,
    ) -> Self {
        Self {
            ctx,
            uri,
            hints,
            factory,
            queue,
            metrics,
            normalizer: FrameNormalizer::new(canvas.0, canvas.1),
            backoff,
            state: Arc::new(Mutex::new(AcquisitionState::Idle)),
            sequence: 0,
        }
    }

    /// Start the grabber thread
    pub fn spawn(self) -> Result<AcquisitionHandle, FleetError> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let (done_tx, done_rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let ctx = self.ctx.clone();

        let thread = std::thread::Builder::new()
            .name(format!("grabber-{}", self.ctx.id))
            .spawn(move || {
                let span = self.ctx.span();
                let _enter = span.enter();
                self.run(stop_rx);
                let _ = done_tx.send(());
            })?;

        Ok(AcquisitionHandle {
            ctx,
            stop_tx: Some(stop_tx),
            done_rx: Some(done_rx),
            thread: Some(thread),
            state,
        })
    }

    fn set_state(&self, state: AcquisitionState) {
        *self.state.lock() = state;
    }

    fn run(mut self, stop_rx: Receiver<()>) {
        info!("Frame grabber started for {}", self.uri);

        while !stop_requested(&stop_rx) {
            self.set_state(AcquisitionState::Connecting);
            CameraMetrics::incr(&self.metrics.connection_attempts);
            info!("Connecting to {}", self.uri);

            let stream = match self.factory.open(&self.uri, &self.hints) {
                Ok(stream) if stream.is_opened() => stream,
                Ok(_) => {
                    warn!("Stream not ready after open");
                    if !self.wait_backoff(&stop_rx) {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("Failed to open stream: {}", e);
                    if !self.wait_backoff(&stop_rx) {
                        break;
                    }
                    continue;
                }
            };

            match self.stream_frames(stream, &stop_rx) {
                SessionEnd::Stopped => break,
                SessionEnd::ReadFailed(e) => {
                    warn!("Failed to read frame: {}", e);
                }
                SessionEnd::Faulted(e) => {
                    CameraMetrics::incr(&self.metrics.errors);
                    error!("Frame grabber error: {}", e);
                }
            }

            if !self.wait_backoff(&stop_rx) {
                break;
            }
        }

        self.set_state(AcquisitionState::Stopped);
        info!("Frame grabber stopped");
    }

    /// Read until the stream fails or a stop is requested. The stream is
    /// released when this returns.
    fn stream_frames(&mut self, mut stream: Box<dyn FrameStream>, stop_rx: &Receiver<()>) -> SessionEnd {
        let mut connected = false;

        loop {
            if stop_requested(stop_rx) {
                return SessionEnd::Stopped;
            }

            let original = match stream.read() {
                Ok(frame) => frame,
                Err(e) => return SessionEnd::ReadFailed(e),
            };

            let captured_at = Instant::now();
            if !connected {
                connected = true;
                self.set_state(AcquisitionState::Streaming);
                CameraMetrics::incr(&self.metrics.successful_connections);
                info!(
                    "Stream connected ({}x{})",
                    original.width(),
                    original.height()
                );
            }
            self.backoff.reset();
            self.metrics.record_frame(captured_at);

            let (normalized, params) = match self.normalizer.normalize(&original) {
                Ok(result) => result,
                Err(e) => return SessionEnd::Faulted(e),
            };

            self.sequence += 1;
            let frame = QueuedFrame {
                sequence: self.sequence,
                original,
                normalized,
                params,
                captured_at,
            };

            if let Some(evicted) = self.queue.push(frame) {
                CameraMetrics::incr(&self.metrics.frames_dropped);
                debug!("Queue full, dropped frame {}", evicted.sequence);
            }
        }
    }

    /// Sleep for the next backoff delay; returns false if stopped meanwhile
    fn wait_backoff(&mut self, stop_rx: &Receiver<()>) -> bool {
        self.set_state(AcquisitionState::Connecting);
        let delay = self.backoff.next_delay();
        debug!("Reconnecting in {:?}", delay);
        !wait_for_stop(stop_rx, delay)
    }
}

/// Non-blocking check whether the owning handle asked us to stop
fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    wait_for_stop(stop_rx, Duration::ZERO)
}

/// Wait up to `timeout` for a stop request. A dropped sender counts as one.
fn wait_for_stop(stop_rx: &Receiver<()>, timeout: Duration) -> bool {
    match stop_rx.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

/// Owner side of a running grabber thread
pub struct AcquisitionHandle {
    ctx: CameraContext,
    stop_tx: Option<Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
    thread: Option<JoinHandle<()>>,
    state: Arc<Mutex<AcquisitionState>>,
}

impl AcquisitionHandle {
    pub fn state(&self) -> AcquisitionState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the thread to stop without waiting for it
    pub fn signal_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
    }

    /// Signal the thread and wait up to `timeout` for it to exit.
    ///
    /// Returns false if the thread did not finish in time; it is then
    /// detached and will exit at its next stop check.
    pub async fn stop(&mut self, timeout: Duration) -> bool {
        self.signal_stop();

        let Some(done_rx) = self.done_rx.take() else {
            return true;
        };

        match tokio::time::timeout(timeout, done_rx).await {
            Ok(_) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        error!(camera_id = %self.ctx.id, "Frame grabber thread panicked");
                    }
                }
                true
            }
            Err(_) => {
                warn!(
                    camera_id = %self.ctx.id,
                    "Frame grabber did not stop within {:?}, detaching", timeout
                );
                self.thread.take();
                false
            }
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        // dropping the sender wakes the thread out of any backoff sleep
        self.stop_tx.take();
    }
}
