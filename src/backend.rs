use crate::camera::CameraStatus;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::events::DetectionEvent;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Camera configuration as served by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "rtsp_url")]
    pub source_uri: String,
    #[serde(default, rename = "status")]
    pub declared_status: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl CameraRecord {
    /// Fill in defaults the wire form may omit
    pub fn normalized(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = self.id.clone();
        }
        self.declared_status = self.declared_status.trim().to_lowercase();
        self.source_uri = self.source_uri.trim().to_string();
        self
    }

    /// Location reported in event metadata; the camera name when unset
    pub fn event_location(&self) -> String {
        match self.location.as_deref().map(str::trim) {
            Some(location) if !location.is_empty() => location.to_string(),
            _ => self.name.clone(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.declared_status == CameraStatus::Offline.as_str()
    }

    pub fn is_online(&self) -> bool {
        self.declared_status == CameraStatus::Online.as_str()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "camera id must be a string or number, got {}",
            other
        ))),
    }
}

#[derive(Serialize)]
struct StatusUpdate {
    status: CameraStatus,
}

/// REST collector receiving camera status and detection events
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn list_cameras(&self) -> Result<Vec<CameraRecord>, BackendError>;

    async fn update_camera_status(
        &self,
        camera_id: &str,
        status: CameraStatus,
    ) -> Result<(), BackendError>;

    async fn submit_event(&self, event: &DetectionEvent) -> Result<(), BackendError>;
}

/// Blocking `ureq` client driven from tokio's blocking pool
pub struct HttpBackendClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    status_timeout: Duration,
    event_timeout: Duration,
    list_timeout: Duration,
}

impl HttpBackendClient {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            status_timeout: config.status_timeout(),
            event_timeout: config.event_timeout(),
            list_timeout: config.list_timeout(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str, timeout: Duration) -> ureq::Request {
        self.agent
            .request(method, &self.url(path))
            .timeout(timeout)
            .set("X-API-Key", &self.api_key)
    }
}

fn map_ureq_error(endpoint: &str, error: ureq::Error) -> BackendError {
    match error {
        ureq::Error::Status(status, _) => BackendError::Status {
            endpoint: endpoint.to_string(),
            status,
        },
        ureq::Error::Transport(t) => BackendError::Transport {
            endpoint: endpoint.to_string(),
            details: t.to_string(),
        },
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, BackendError>
where
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackendError::Task {
            details: e.to_string(),
        })?
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn list_cameras(&self) -> Result<Vec<CameraRecord>, BackendError> {
        let endpoint = "/cameras".to_string();
        let request = self.request("GET", &endpoint, self.list_timeout);

        let records = run_blocking(move || {
            let response = request.call().map_err(|e| map_ureq_error(&endpoint, e))?;
            response
                .into_json::<Vec<CameraRecord>>()
                .map_err(|e| BackendError::Payload {
                    endpoint: endpoint.clone(),
                    details: e.to_string(),
                })
        })
        .await?;

        debug!("Backend listed {} cameras", records.len());
        Ok(records.into_iter().map(CameraRecord::normalized).collect())
    }

    async fn update_camera_status(
        &self,
        camera_id: &str,
        status: CameraStatus,
    ) -> Result<(), BackendError> {
        let endpoint = format!("/cameras/{}/status", camera_id);
        let request = self.request("PUT", &endpoint, self.status_timeout);

        run_blocking(move || {
            request
                .send_json(StatusUpdate { status })
                .map_err(|e| map_ureq_error(&endpoint, e))?;
            Ok(())
        })
        .await?;

        trace!("Reported camera {} as {}", camera_id, status);
        Ok(())
    }

    async fn submit_event(&self, event: &DetectionEvent) -> Result<(), BackendError> {
        let endpoint = "/events".to_string();
        let request = self.request("POST", &endpoint, self.event_timeout);
        let body = serde_json::to_value(event).map_err(|e| BackendError::Payload {
            endpoint: endpoint.clone(),
            details: e.to_string(),
        })?;

        run_blocking(move || {
            request
                .send_json(body)
                .map_err(|e| map_ureq_error(&endpoint, e))?;
            Ok(())
        })
        .await
    }
}
