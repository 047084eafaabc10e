use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Span;

/// Status of a camera as reported to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Starting,
    Online,
    Offline,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Starting => "starting",
            CameraStatus::Online => "online",
            CameraStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a camera carried by every worker for log context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraContext {
    pub id: String,
    pub name: String,
}

impl CameraContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Span tagging every log line with the camera identity
    pub fn span(&self) -> Span {
        tracing::info_span!("camera", camera_id = %self.id, camera_name = %self.name)
    }
}

impl fmt::Display for CameraContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
