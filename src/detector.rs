use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::frame::BBox;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// A single object found by the detector, in canvas coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BBox, track_id: Option<i64>) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
            track_id,
        }
    }
}

/// Object detection engine shared by every camera.
///
/// Calls for one camera are sequential, so implementations that track
/// objects can keep per-camera state keyed by `camera_id`.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(
        &self,
        camera_id: &str,
        frame: &RgbImage,
    ) -> Result<Vec<Detection>, DetectorError>;
}

/// Encode an RGB frame as JPEG
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(buffer)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectorResponse {
    List(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

impl DetectorResponse {
    fn into_detections(self) -> Vec<Detection> {
        match self {
            DetectorResponse::List(detections) => detections,
            DetectorResponse::Wrapped { detections } => detections,
        }
    }
}

/// Detector reached over HTTP: posts the JPEG frame and parses a JSON list
pub struct HttpDetector {
    agent: ureq::Agent,
    endpoint: String,
    jpeg_quality: u8,
}

impl HttpDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            endpoint: config.endpoint.clone(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(
        &self,
        camera_id: &str,
        frame: &RgbImage,
    ) -> Result<Vec<Detection>, DetectorError> {
        let body = encode_jpeg(frame, self.jpeg_quality).map_err(|e| DetectorError::Encoding {
            details: e.to_string(),
        })?;
        trace!("Posting {} byte frame to detector", body.len());

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let camera_id = camera_id.to_string();

        let detections = tokio::task::spawn_blocking(move || {
            let response = agent
                .post(&endpoint)
                .query("camera_id", &camera_id)
                .set("Content-Type", "image/jpeg")
                .send_bytes(&body)
                .map_err(|e| match e {
                    ureq::Error::Status(code, _) => DetectorError::Inference {
                        details: format!("detector returned HTTP {}", code),
                    },
                    ureq::Error::Transport(t) => DetectorError::Unavailable {
                        details: t.to_string(),
                    },
                })?;

            response
                .into_json::<DetectorResponse>()
                .map(DetectorResponse::into_detections)
                .map_err(|e| DetectorError::MalformedResponse {
                    details: e.to_string(),
                })
        })
        .await
        .map_err(|e| DetectorError::Unavailable {
            details: format!("detector task failed: {}", e),
        })??;

        debug!("Detector returned {} detections", detections.len());
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detector_list() {
        let json = r#"[
            {"class_id": 0, "confidence": 0.91, "bbox": [10, 20, 110, 220], "track_id": 7},
            {"class_id": 2, "confidence": 0.40, "bbox": [0, 0, 5, 5]}
        ]"#;
        let detections = serde_json::from_str::<DetectorResponse>(json)
            .unwrap()
            .into_detections();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].track_id, Some(7));
        assert_eq!(detections[0].bbox, BBox::new(10.0, 20.0, 110.0, 220.0));
        assert_eq!(detections[1].track_id, None);
    }

    #[test]
    fn test_parse_wrapped_response() {
        let json = r#"{"detections": [{"class_id": 0, "confidence": 0.7, "bbox": [1, 2, 3, 4]}]}"#;
        let detections = serde_json::from_str::<DetectorResponse>(json)
            .unwrap()
            .into_detections();
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn test_encode_jpeg() {
        let frame = RgbImage::from_pixel(32, 16, image::Rgb([10, 200, 30]));
        let bytes = encode_jpeg(&frame, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
