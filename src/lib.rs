pub mod acquisition;
pub mod backend;
pub mod camera;
pub mod config;
pub mod cooldown;
pub mod detection;
pub mod detector;
pub mod error;
pub mod events;
pub mod fleet;
pub mod frame;
pub mod health;
pub mod metrics;
pub mod normalize;
pub mod recovery;
pub mod ring_buffer;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{BackendClient, CameraRecord, HttpBackendClient};
pub use camera::{CameraContext, CameraStatus};
pub use config::FleetConfig;
pub use detector::{Detection, HttpDetector, ObjectDetector};
pub use error::{FleetError, Result};
pub use events::DetectionEvent;
pub use fleet::{ComponentState, FleetManager, ShutdownHandle, ShutdownReason};
pub use frame::{BBox, QueuedFrame};
pub use metrics::{CameraMetrics, FleetSummary, MetricsSnapshot};
pub use normalize::{FrameNormalizer, LetterboxParams};
pub use ring_buffer::{RingBuffer, RingBufferBuilder};
pub use source::{DefaultSourceFactory, FrameSourceFactory, FrameStream};
