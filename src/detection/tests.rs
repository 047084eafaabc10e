use super::*;
use crate::camera::CameraContext;
use crate::config::FleetConfig;
use crate::detector::Detection;
use crate::error::DetectorError;
use crate::frame::{BBox, QueuedFrame};
use crate::metrics::CameraMetrics;
use crate::ring_buffer::RingBuffer;
use crate::test_support::{queued_frame, MockBackend, ScriptedDetector};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    backend: Arc<MockBackend>,
    detector: Arc<ScriptedDetector>,
    metrics: Arc<CameraMetrics>,
    queue: Arc<RingBuffer<QueuedFrame>>,
    snapshot_dir: TempDir,
}

impl Harness {
    fn new(detector: ScriptedDetector) -> Self {
        Self {
            backend: Arc::new(MockBackend::new(Vec::new())),
            detector: Arc::new(detector),
            metrics: Arc::new(CameraMetrics::new()),
            queue: Arc::new(RingBuffer::new(10)),
            snapshot_dir: TempDir::new().unwrap(),
        }
    }

    fn worker_with(&self, config: &FleetConfig, snapshot_dir: std::path::PathBuf) -> DetectionWorker {
        let deps = DetectionDeps {
            detector: self.detector.clone(),
            backend: self.backend.clone(),
            snapshots: Arc::new(SnapshotStore::new(snapshot_dir, 90)),
        };
        DetectionWorker::new(
            CameraContext::new("cam1", "Front Door"),
            "Lobby".to_string(),
            Arc::clone(&self.queue),
            deps,
            Arc::clone(&self.metrics),
            &config.detection,
        )
        .with_timings(WorkerTimings {
            idle: Duration::from_millis(5),
            after_item: Duration::from_millis(1),
            after_error: Duration::from_millis(5),
        })
    }

    fn worker(&self, config: &FleetConfig) -> DetectionWorker {
        self.worker_with(config, self.snapshot_dir.path().to_path_buf())
    }
}

fn person(track_id: Option<i64>) -> Detection {
    // 50 x 100 = 5000 px in a 640x480 source (identity letterbox)
    Detection::new(0, 0.9, BBox::new(100.0, 100.0, 150.0, 200.0), track_id)
}

#[tokio::test]
async fn test_tracked_person_emits_one_event_with_snapshot() {
    let harness = Harness::new(ScriptedDetector::always(vec![person(Some(7))]));
    let mut worker = harness.worker(&FleetConfig::default());

    let emitted = worker
        .process_frame(&queued_frame(640, 480, 1), Instant::now())
        .await
        .unwrap();
    assert_eq!(emitted, 1);

    let events = harness.backend.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.camera_id, "cam1");
    assert_eq!(event.camera_name, "Front Door");
    assert_eq!(event.track_or_person_id, 7);
    assert!((event.confidence - 0.9).abs() < f32::EPSILON);
    assert_eq!(event.bbox(), BBox::new(100.0, 100.0, 150.0, 200.0));
    assert_eq!(event.metadata.location, "Lobby");

    let image_path = event.image_path.as_ref().expect("snapshot recorded");
    assert!(image_path.starts_with("cam1_t7_"));
    assert!(harness.snapshot_dir.path().join(image_path).exists());

    assert_eq!(harness.metrics.detections_made.load(Ordering::Relaxed), 1);
    assert_eq!(harness.metrics.events_logged(), 1);
}

#[tokio::test]
async fn test_same_track_within_cooldown_emits_once() {
    let harness = Harness::new(ScriptedDetector::always(vec![person(Some(7))]));
    let mut worker = harness.worker(&FleetConfig::default());
    let start = Instant::now();

    worker
        .process_frame(&queued_frame(640, 480, 1), start)
        .await
        .unwrap();
    let second = worker
        .process_frame(&queued_frame(640, 480, 2), start + Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(second, 0);
    assert_eq!(harness.backend.events().len(), 1);
    // both detections passed the class filter
    assert_eq!(harness.metrics.detections_made.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_untracked_detection_uses_position_cooldown() {
    let harness = Harness::new(ScriptedDetector::always(vec![person(None)]));
    let mut worker = harness.worker(&FleetConfig::default());
    let start = Instant::now();

    for offset in [0, 2, 4, 6] {
        worker
            .process_frame(&queued_frame(640, 480, offset), start + Duration::from_secs(offset))
            .await
            .unwrap();
    }

    let events = harness.backend.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.track_or_person_id == 0));
}

#[tokio::test]
async fn test_letterboxed_source_maps_back() {
    // 1920x1080 source: scale 1/3, pad_y 60
    let canvas_box = BBox::new(100.0, 160.0, 150.0, 260.0);
    let harness = Harness::new(ScriptedDetector::always(vec![Detection::new(
        0,
        0.8,
        canvas_box,
        Some(1),
    )]));
    let mut worker = harness.worker(&FleetConfig::default());

    worker
        .process_frame(&queued_frame(1920, 1080, 1), Instant::now())
        .await
        .unwrap();

    let events = harness.backend.events();
    assert_eq!(events.len(), 1);
    let bbox = events[0].bbox();
    assert!((bbox.x1 - 300.0).abs() < 0.5);
    assert!((bbox.y1 - 300.0).abs() < 0.5);
    assert!((bbox.x2 - 450.0).abs() < 0.5);
    assert!((bbox.y2 - 600.0).abs() < 0.5);
}

#[tokio::test]
async fn test_snapshot_failure_still_emits_event() {
    let harness = Harness::new(ScriptedDetector::always(vec![person(Some(3))]));
    let missing = harness.snapshot_dir.path().join("does-not-exist");
    let mut worker = harness.worker_with(&FleetConfig::default(), missing);

    worker
        .process_frame(&queued_frame(640, 480, 1), Instant::now())
        .await
        .unwrap();

    let events = harness.backend.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].image_path.is_none());
    assert_eq!(harness.metrics.snapshots_failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_backend_failure_counts_error() {
    let harness = Harness::new(ScriptedDetector::always(vec![person(Some(3))]));
    harness.backend.set_fail_events(true);
    let mut worker = harness.worker(&FleetConfig::default());

    let emitted = worker
        .process_frame(&queued_frame(640, 480, 1), Instant::now())
        .await
        .unwrap();

    assert_eq!(emitted, 1);
    assert!(harness.backend.events().is_empty());
    assert_eq!(harness.metrics.errors(), 1);
    assert_eq!(harness.metrics.events_logged(), 0);
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn test_run_loop_applies_frame_stride() {
    let harness = Harness::new(ScriptedDetector::always(vec![person(Some(7))]));
    let worker = harness.worker(&FleetConfig::default());

    for seq in 0..10 {
        harness.queue.push(queued_frame(640, 480, seq));
    }

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    let metrics = Arc::clone(&harness.metrics);
    let queue = Arc::clone(&harness.queue);
    let detector = Arc::clone(&harness.detector);
    wait_for(move || {
        queue.is_empty()
            && detector.calls() == 2
            && metrics.frames_skipped.load(Ordering::Relaxed) == 8
    })
    .await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    // second sampled frame falls inside the 30s track cooldown
    assert_eq!(harness.backend.events().len(), 1);
}

#[tokio::test]
async fn test_run_loop_survives_detector_errors() {
    let detector = ScriptedDetector::always(vec![person(Some(9))]);
    detector.push_response(Err(DetectorError::Inference {
        details: "model crashed".to_string(),
    }));
    let harness = Harness::new(detector);

    let mut config = FleetConfig::default();
    config.detection.frame_stride = 1;
    let worker = harness.worker(&config);

    harness.queue.push(queued_frame(640, 480, 1));
    harness.queue.push(queued_frame(640, 480, 2));

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    let backend = Arc::clone(&harness.backend);
    wait_for(move || backend.events().len() == 1).await;

    token.cancel();
    handle.await.unwrap();

    assert_eq!(harness.metrics.errors(), 1);
    assert_eq!(harness.detector.calls(), 2);
}

#[tokio::test]
async fn test_run_loop_survives_detector_panic() {
    let detector = ScriptedDetector::always(vec![person(Some(3))]);
    detector.panic_next(1);
    let harness = Harness::new(detector);

    let mut config = FleetConfig::default();
    config.detection.frame_stride = 1;
    let worker = harness.worker(&config);

    harness.queue.push(queued_frame(640, 480, 1));
    harness.queue.push(queued_frame(640, 480, 2));

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    let backend = Arc::clone(&harness.backend);
    wait_for(move || backend.events().len() == 1).await;

    token.cancel();
    handle.await.unwrap();

    assert_eq!(harness.metrics.errors(), 1);
    assert_eq!(harness.detector.calls(), 2);
    assert_eq!(harness.backend.events()[0].track_or_person_id, 3);
}

#[tokio::test]
async fn test_cancellation_stops_idle_worker() {
    let harness = Harness::new(ScriptedDetector::default());
    let worker = harness.worker(&FleetConfig::default());

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker exits promptly")
        .unwrap();
    assert_eq!(harness.detector.calls(), 0);
}
