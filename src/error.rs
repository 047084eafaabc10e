use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FleetError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether a pipeline can keep running after this error.
    ///
    /// Only configuration and internal system errors are terminal; everything
    /// coming from the camera, the detector or the backend is retried on the
    /// next natural cycle.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            FleetError::Config(_) | FleetError::TomlSer(_) | FleetError::System { .. }
        )
    }
}

/// Transport-level failures from a frame source
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Failed to open source {uri}: {details}")]
    Open { uri: String, details: String },

    #[error("Source {uri} is not ready")]
    NotReady { uri: String },

    #[error("Frame read failed: {details}")]
    Read { details: String },

    #[error("No frame received within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("End of stream")]
    EndOfStream,

    #[error("Unsupported source URI: {uri}")]
    Unsupported { uri: String },

    #[error("Invalid frame: {details}")]
    InvalidFrame { details: String },
}

/// Failures invoking the object detector
#[derive(Error, Debug, Clone)]
pub enum DetectorError {
    #[error("Detector unavailable: {details}")]
    Unavailable { details: String },

    #[error("Inference failed: {details}")]
    Inference { details: String },

    #[error("Malformed detector response: {details}")]
    MalformedResponse { details: String },

    #[error("Frame encoding failed: {details}")]
    Encoding { details: String },
}

/// Failures talking to the backend collector
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("Backend returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Transport error calling {endpoint}: {details}")]
    Transport { endpoint: String, details: String },

    #[error("Invalid backend payload from {endpoint}: {details}")]
    Payload { endpoint: String, details: String },

    #[error("Backend task failed: {details}")]
    Task { details: String },
}

/// Failures persisting snapshot crops
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Failed to write snapshot {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transport = FleetError::from(SourceError::EndOfStream);
        assert!(transport.is_recoverable());

        let backend = FleetError::from(BackendError::Status {
            endpoint: "/events".to_string(),
            status: 500,
        });
        assert!(backend.is_recoverable());

        assert!(!FleetError::system("no cameras admitted").is_recoverable());
        assert!(!FleetError::Config(config::ConfigError::Message("bad".to_string()))
            .is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::Status {
            endpoint: "/cameras/cam1/status".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "Backend returned HTTP 404 for /cameras/cam1/status"
        );

        let err = FleetError::component("grabber-cam1", "thread limit reached");
        assert_eq!(err.to_string(), "Component error in grabber-cam1: thread limit reached");
        assert!(err.is_recoverable());
    }
}
