//! In-crate doubles for the backend, detector and frame sources.

use crate::backend::{BackendClient, CameraRecord};
use crate::camera::CameraStatus;
use crate::error::{BackendError, DetectorError, SourceError};
use crate::detector::{Detection, ObjectDetector};
use crate::events::DetectionEvent;
use crate::frame::QueuedFrame;
use crate::normalize::FrameNormalizer;
use crate::source::{CaptureHints, FrameSourceFactory, FrameStream};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub fn camera_record(id: &str, uri: &str, status: &str) -> CameraRecord {
    CameraRecord {
        id: id.to_string(),
        name: format!("Camera {}", id),
        source_uri: uri.to_string(),
        declared_status: status.to_string(),
        location: Some("Test Site".to_string()),
    }
}

/// Letterboxed frame of the given source size onto a 640x480 canvas
pub fn queued_frame(width: u32, height: u32, sequence: u64) -> QueuedFrame {
    let original = RgbImage::from_pixel(width, height, Rgb([90, 120, 150]));
    let mut normalizer = FrameNormalizer::new(640, 480);
    let (normalized, params) = normalizer
        .normalize(&original)
        .expect("test frame normalizes");
    QueuedFrame {
        sequence,
        original,
        normalized,
        params,
        captured_at: Instant::now(),
    }
}

/// Backend double recording every call
#[derive(Default)]
pub struct MockBackend {
    cameras: Mutex<Vec<CameraRecord>>,
    events: Mutex<Vec<DetectionEvent>>,
    status_updates: Mutex<Vec<(String, CameraStatus)>>,
    fail_events: AtomicBool,
    fail_status: AtomicBool,
    fail_list: AtomicBool,
}

impl MockBackend {
    pub fn new(cameras: Vec<CameraRecord>) -> Self {
        Self {
            cameras: Mutex::new(cameras),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<DetectionEvent> {
        self.events.lock().clone()
    }

    pub fn status_updates(&self) -> Vec<(String, CameraStatus)> {
        self.status_updates.lock().clone()
    }

    pub fn updates_for(&self, camera_id: &str) -> Vec<CameraStatus> {
        self.status_updates
            .lock()
            .iter()
            .filter(|(id, _)| id == camera_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn set_fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn list_cameras(&self) -> Result<Vec<CameraRecord>, BackendError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                endpoint: "/cameras".to_string(),
                status: 503,
            });
        }
        Ok(self.cameras.lock().clone())
    }

    async fn update_camera_status(
        &self,
        camera_id: &str,
        status: CameraStatus,
    ) -> Result<(), BackendError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(BackendError::Transport {
                endpoint: format!("/cameras/{}/status", camera_id),
                details: "connection refused".to_string(),
            });
        }
        self.status_updates
            .lock()
            .push((camera_id.to_string(), status));
        Ok(())
    }

    async fn submit_event(&self, event: &DetectionEvent) -> Result<(), BackendError> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                endpoint: "/events".to_string(),
                status: 500,
            });
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Detector returning queued responses, then a fixed fallback
#[derive(Default)]
pub struct ScriptedDetector {
    responses: Mutex<VecDeque<Result<Vec<Detection>, DetectorError>>>,
    fallback: Mutex<Vec<Detection>>,
    calls: AtomicUsize,
    panics: AtomicUsize,
}

impl ScriptedDetector {
    pub fn always(detections: Vec<Detection>) -> Self {
        Self {
            fallback: Mutex::new(detections),
            ..Default::default()
        }
    }

    pub fn push_response(&self, response: Result<Vec<Detection>, DetectorError>) {
        self.responses.lock().push_back(response);
    }

    /// Panic on the next `count` calls
    pub fn panic_next(&self, count: usize) {
        self.panics.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectDetector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(
        &self,
        _camera_id: &str,
        _frame: &RgbImage,
    ) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("scripted detector panic");
        }
        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        Ok(self.fallback.lock().clone())
    }
}

/// Source factory whose first `failing_opens` opens fail and whose streams
/// deliver `frames_per_stream` frames before ending
pub struct ScriptedSourceFactory {
    width: u32,
    height: u32,
    frame_interval: Duration,
    frames_per_stream: Option<usize>,
    failing_opens: AtomicU32,
    opens: AtomicU32,
}

impl ScriptedSourceFactory {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(5),
            frames_per_stream: None,
            failing_opens: AtomicU32::new(0),
            opens: AtomicU32::new(0),
        }
    }

    pub fn failing_opens(self, count: u32) -> Self {
        self.failing_opens.store(count, Ordering::SeqCst);
        self
    }

    /// How long each read blocks before returning a frame
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn frames_per_stream(mut self, frames: usize) -> Self {
        self.frames_per_stream = Some(frames);
        self
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl FrameSourceFactory for ScriptedSourceFactory {
    fn open(&self, uri: &str, _hints: &CaptureHints) -> Result<Box<dyn FrameStream>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let remaining_failures = self.failing_opens.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.failing_opens
                .store(remaining_failures - 1, Ordering::SeqCst);
            return Err(SourceError::Open {
                uri: uri.to_string(),
                details: "scripted failure".to_string(),
            });
        }

        Ok(Box::new(ScriptedStream {
            width: self.width,
            height: self.height,
            frame_interval: self.frame_interval,
            remaining: self.frames_per_stream,
        }))
    }
}

struct ScriptedStream {
    width: u32,
    height: u32,
    frame_interval: Duration,
    remaining: Option<usize>,
}

impl FrameStream for ScriptedStream {
    fn is_opened(&self) -> bool {
        true
    }

    fn read(&mut self) -> Result<RgbImage, SourceError> {
        std::thread::sleep(self.frame_interval);
        match self.remaining.as_mut() {
            Some(0) => Err(SourceError::EndOfStream),
            Some(n) => {
                *n -= 1;
                Ok(RgbImage::new(self.width, self.height))
            }
            None => Ok(RgbImage::new(self.width, self.height)),
        }
    }
}
