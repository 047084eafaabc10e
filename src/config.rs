use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FleetConfig {
    pub backend: BackendConfig,
    pub detector: DetectorConfig,
    pub detection: DetectionConfig,
    pub capture: CaptureConfig,
    pub fleet: FleetSettings,
    pub snapshot: SnapshotConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend collector (e.g. http://localhost:8000/api)
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,

    /// Value sent in the X-API-Key header
    #[serde(default)]
    pub api_key: String,

    /// Timeout for camera status updates in seconds
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,

    /// Timeout for event submission in seconds
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,

    /// Timeout for the camera list request in seconds
    #[serde(default = "default_list_timeout_secs")]
    pub list_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Inference endpoint receiving JPEG frames
    #[serde(default = "default_detector_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_detector_timeout_secs")]
    pub timeout_secs: u64,

    /// JPEG quality used when uploading frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Detection canvas width in pixels
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,

    /// Detection canvas height in pixels
    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,

    /// Detections must score strictly above this value
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Class id kept by the filter (0 = person)
    #[serde(default)]
    pub person_class_id: u32,

    /// Minimum interval between events for the same track
    #[serde(default = "default_track_cooldown_secs")]
    pub track_cooldown_secs: u64,

    /// Minimum interval between events for the same quantized box
    #[serde(default = "default_event_cooldown_secs")]
    pub event_cooldown_secs: u64,

    /// Process every Nth dequeued frame
    #[serde(default = "default_frame_stride")]
    pub frame_stride: u32,

    /// Minimum source-space box area in square pixels
    #[serde(default = "default_min_box_area")]
    pub min_box_area: f32,

    /// Maximum entries kept in each camera's cooldown table
    #[serde(default = "default_cooldown_table_capacity")]
    pub cooldown_table_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Capacity of each camera's frame queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Transport buffer depth requested from the source
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,

    /// Target frame rate requested from the source
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,

    /// Opaque transport options as "key;value;key;value"
    #[serde(default)]
    pub transport_options: String,

    /// First reconnect delay in seconds
    #[serde(default = "default_reconnect_base_delay_secs")]
    pub reconnect_base_delay_secs: u64,

    /// Reconnect delay ceiling in seconds
    #[serde(default = "default_reconnect_max_delay_secs")]
    pub reconnect_max_delay_secs: u64,

    /// Per-read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// How long stop() waits for the grabber thread
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FleetSettings {
    /// Comma separated allow-list of camera ids (empty = all)
    #[serde(default)]
    pub camera_ids: String,

    /// Admit cameras the backend reports as offline
    #[serde(default)]
    pub include_offline: bool,

    /// Health check interval in seconds
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// A camera with no frame for this long is reported offline
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Log a metrics summary every N health ticks (0 disables)
    #[serde(default)]
    pub metrics_log_every_ticks: u32,

    /// Upper bound for stopping every pipeline
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SnapshotConfig {
    /// Directory receiving snapshot crops
    #[serde(default = "default_snapshot_directory")]
    pub directory: String,

    /// JPEG quality of snapshot crops
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Optional log file written next to console output
    #[serde(default)]
    pub file: Option<String>,
}

impl FleetConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("backend.base_url", default_backend_base_url())?
            .set_default("backend.api_key", "")?
            .set_default(
                "backend.status_timeout_secs",
                default_status_timeout_secs() as i64,
            )?
            .set_default(
                "backend.event_timeout_secs",
                default_event_timeout_secs() as i64,
            )?
            .set_default(
                "backend.list_timeout_secs",
                default_list_timeout_secs() as i64,
            )?
            .set_default("detector.endpoint", default_detector_endpoint())?
            .set_default(
                "detector.timeout_secs",
                default_detector_timeout_secs() as i64,
            )?
            .set_default("detector.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("detection.canvas_width", default_canvas_width() as i64)?
            .set_default("detection.canvas_height", default_canvas_height() as i64)?
            .set_default(
                "detection.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default("detection.person_class_id", 0i64)?
            .set_default(
                "detection.track_cooldown_secs",
                default_track_cooldown_secs() as i64,
            )?
            .set_default(
                "detection.event_cooldown_secs",
                default_event_cooldown_secs() as i64,
            )?
            .set_default("detection.frame_stride", default_frame_stride() as i64)?
            .set_default("detection.min_box_area", default_min_box_area() as f64)?
            .set_default(
                "detection.cooldown_table_capacity",
                default_cooldown_table_capacity() as i64,
            )?
            .set_default("capture.queue_capacity", default_queue_capacity() as i64)?
            .set_default("capture.buffer_size", default_buffer_size() as i64)?
            .set_default("capture.target_fps", default_target_fps() as i64)?
            .set_default("capture.transport_options", "")?
            .set_default(
                "capture.reconnect_base_delay_secs",
                default_reconnect_base_delay_secs() as i64,
            )?
            .set_default(
                "capture.reconnect_max_delay_secs",
                default_reconnect_max_delay_secs() as i64,
            )?
            .set_default("capture.read_timeout_ms", default_read_timeout_ms() as i64)?
            .set_default(
                "capture.join_timeout_secs",
                default_join_timeout_secs() as i64,
            )?
            .set_default("fleet.camera_ids", "")?
            .set_default("fleet.include_offline", false)?
            .set_default(
                "fleet.health_check_interval_secs",
                default_health_check_interval_secs() as i64,
            )?
            .set_default("fleet.stale_after_secs", default_stale_after_secs() as i64)?
            .set_default("fleet.metrics_log_every_ticks", 0i64)?
            .set_default(
                "fleet.shutdown_timeout_secs",
                default_shutdown_timeout_secs() as i64,
            )?
            .set_default("snapshot.directory", default_snapshot_directory())?
            .set_default("snapshot.jpeg_quality", default_jpeg_quality() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // CAMFLEET_DETECTION__CONFIDENCE_THRESHOLD=0.6 style overrides
            .add_source(
                Environment::with_prefix("CAMFLEET")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: FleetConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Backend base_url must not be empty".to_string(),
            ));
        }

        if self.detection.canvas_width == 0 || self.detection.canvas_height == 0 {
            return Err(ConfigError::Message(
                "Detection canvas dimensions must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::Message(
                "Confidence threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.detection.frame_stride == 0 {
            return Err(ConfigError::Message(
                "Frame stride must be greater than 0".to_string(),
            ));
        }

        if self.detection.cooldown_table_capacity == 0 {
            return Err(ConfigError::Message(
                "Cooldown table capacity must be greater than 0".to_string(),
            ));
        }

        if self.capture.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Frame queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.capture.reconnect_base_delay_secs > self.capture.reconnect_max_delay_secs {
            return Err(ConfigError::Message(
                "Reconnect base delay must not exceed the max delay".to_string(),
            ));
        }

        if self.fleet.health_check_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Health check interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl BackendConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

impl DetectionConfig {
    pub fn track_cooldown(&self) -> Duration {
        Duration::from_secs(self.track_cooldown_secs)
    }

    pub fn event_cooldown(&self) -> Duration {
        Duration::from_secs(self.event_cooldown_secs)
    }
}

impl CaptureConfig {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_base_delay_secs)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    /// Split `transport_options` into key/value pairs. A trailing key
    /// without a value is ignored.
    pub fn transport_option_pairs(&self) -> Vec<(String, String)> {
        let parts: Vec<&str> = self
            .transport_options
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        parts
            .chunks_exact(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect()
    }
}

impl FleetSettings {
    /// Parsed camera allow-list; `None` admits every camera.
    pub fn allow_list(&self) -> Option<Vec<String>> {
        let ids: Vec<String> = self
            .camera_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        if ids.is_empty() {
            None
        } else {
            Some(ids)
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: default_backend_base_url(),
                api_key: String::new(),
                status_timeout_secs: default_status_timeout_secs(),
                event_timeout_secs: default_event_timeout_secs(),
                list_timeout_secs: default_list_timeout_secs(),
            },
            detector: DetectorConfig {
                endpoint: default_detector_endpoint(),
                timeout_secs: default_detector_timeout_secs(),
                jpeg_quality: default_jpeg_quality(),
            },
            detection: DetectionConfig {
                canvas_width: default_canvas_width(),
                canvas_height: default_canvas_height(),
                confidence_threshold: default_confidence_threshold(),
                person_class_id: 0,
                track_cooldown_secs: default_track_cooldown_secs(),
                event_cooldown_secs: default_event_cooldown_secs(),
                frame_stride: default_frame_stride(),
                min_box_area: default_min_box_area(),
                cooldown_table_capacity: default_cooldown_table_capacity(),
            },
            capture: CaptureConfig {
                queue_capacity: default_queue_capacity(),
                buffer_size: default_buffer_size(),
                target_fps: default_target_fps(),
                transport_options: String::new(),
                reconnect_base_delay_secs: default_reconnect_base_delay_secs(),
                reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
                read_timeout_ms: default_read_timeout_ms(),
                join_timeout_secs: default_join_timeout_secs(),
            },
            fleet: FleetSettings {
                camera_ids: String::new(),
                include_offline: false,
                health_check_interval_secs: default_health_check_interval_secs(),
                stale_after_secs: default_stale_after_secs(),
                metrics_log_every_ticks: 0,
                shutdown_timeout_secs: default_shutdown_timeout_secs(),
            },
            snapshot: SnapshotConfig {
                directory: default_snapshot_directory(),
                jpeg_quality: default_jpeg_quality(),
            },
            logging: LoggingConfig { file: None },
        }
    }
}

// Default value functions
fn default_backend_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_status_timeout_secs() -> u64 {
    5
}
fn default_event_timeout_secs() -> u64 {
    10
}
fn default_list_timeout_secs() -> u64 {
    10
}

fn default_detector_endpoint() -> String {
    "http://localhost:8500/detect".to_string()
}
fn default_detector_timeout_secs() -> u64 {
    10
}
fn default_jpeg_quality() -> u8 {
    90
}

fn default_canvas_width() -> u32 {
    640
}
fn default_canvas_height() -> u32 {
    480
}
fn default_confidence_threshold() -> f32 {
    0.5
}
fn default_track_cooldown_secs() -> u64 {
    30
}
fn default_event_cooldown_secs() -> u64 {
    5
}
fn default_frame_stride() -> u32 {
    5
}
fn default_min_box_area() -> f32 {
    1000.0
}
fn default_cooldown_table_capacity() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    10
}
fn default_buffer_size() -> u32 {
    1
}
fn default_target_fps() -> u32 {
    15
}
fn default_reconnect_base_delay_secs() -> u64 {
    1
}
fn default_reconnect_max_delay_secs() -> u64 {
    30
}
fn default_read_timeout_ms() -> u64 {
    5000
}
fn default_join_timeout_secs() -> u64 {
    5
}

fn default_health_check_interval_secs() -> u64 {
    15
}
fn default_stale_after_secs() -> u64 {
    30
}
fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_snapshot_directory() -> String {
    "./detection_images".to_string()
}
