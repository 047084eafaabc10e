use super::pipeline::{CameraPipeline, PipelineDeps};
use super::types::{ComponentState, ShutdownReason};
use crate::backend::{BackendClient, CameraRecord};
use crate::config::FleetConfig;
use crate::detection::{DetectionDeps, SnapshotStore};
use crate::detector::ObjectDetector;
use crate::error::Result;
use crate::metrics::FleetSummary;
use crate::source::FrameSourceFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns every camera pipeline and the health monitor
pub struct FleetManager {
    pub(super) config: FleetConfig,
    pub(super) backend: Arc<dyn BackendClient>,
    pub(super) deps: PipelineDeps,
    pub(super) snapshots: Arc<SnapshotStore>,
    pub(super) pipelines: Vec<CameraPipeline>,
    pub(super) health_task: Option<JoinHandle<()>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl FleetManager {
    pub fn new(
        config: FleetConfig,
        backend: Arc<dyn BackendClient>,
        detector: Arc<dyn ObjectDetector>,
        sources: Arc<dyn FrameSourceFactory>,
    ) -> Self {
        let snapshots = Arc::new(SnapshotStore::from_config(&config.snapshot));
        let deps = PipelineDeps {
            sources,
            detection: DetectionDeps {
                detector,
                backend: Arc::clone(&backend),
                snapshots: Arc::clone(&snapshots),
            },
        };
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            backend,
            deps,
            snapshots,
            pipelines: Vec::new(),
            health_task: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Fetch the camera list and build a pipeline for each admitted camera.
    ///
    /// Returns how many cameras were admitted. Pipelines from a previous
    /// load are replaced.
    pub async fn load_cameras(&mut self) -> Result<usize> {
        let records = self.backend.list_cameras().await?;
        info!("Loaded {} cameras from backend", records.len());

        let admitted = self.admit(records);
        let mut pipelines = Vec::with_capacity(admitted.len());
        for record in admitted {
            info!(
                camera_id = %record.id,
                camera_name = %record.name,
                "Added camera [status={}]",
                if record.declared_status.is_empty() { "unknown" } else { &record.declared_status }
            );
            pipelines.push(CameraPipeline::new(record, &self.config)?);
        }

        info!("Prepared {} cameras for detection", pipelines.len());
        self.pipelines = pipelines;
        Ok(self.pipelines.len())
    }

    /// Apply the allow-list, URI and offline filters; online cameras first
    pub(super) fn admit(&self, mut records: Vec<CameraRecord>) -> Vec<CameraRecord> {
        let allow_list = self.config.fleet.allow_list();
        if let Some(ids) = &allow_list {
            info!("Filtering cameras to: {:?}", ids);
        }

        // stable: keeps backend order within each group
        records.sort_by_key(|record| !record.is_online());

        records
            .into_iter()
            .filter(|record| {
                if let Some(ids) = &allow_list {
                    if !ids.iter().any(|id| id == &record.id) {
                        return false;
                    }
                }
                if record.source_uri.is_empty() {
                    warn!(
                        camera_id = %record.id,
                        camera_name = %record.name,
                        "Skipping camera with empty source URI"
                    );
                    return false;
                }
                if record.is_offline() && !self.config.fleet.include_offline {
                    info!(
                        camera_id = %record.id,
                        camera_name = %record.name,
                        "Skipping offline camera (set fleet.include_offline to include)"
                    );
                    return false;
                }
                true
            })
            .collect()
    }

    pub fn camera_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn pipelines(&self) -> &[CameraPipeline] {
        &self.pipelines
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Aggregate metrics across every loaded camera
    pub fn summary(&self) -> FleetSummary {
        FleetSummary::from_snapshots(
            self.pipelines
                .iter()
                .map(|p| p.metrics().snapshot(p.context()))
                .collect(),
        )
    }

    /// Handle that can trigger shutdown from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_sender),
        }
    }
}

/// Cloneable trigger for a one-time fleet shutdown
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownHandle {
    /// Request shutdown; only the first request is delivered
    pub async fn trigger(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
