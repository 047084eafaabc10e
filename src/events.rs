use crate::frame::BBox;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form event metadata with the two keys the backend always expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub bbox: [f32; 4],
    pub location: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A deduplicated detection reported to the backend. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub camera_id: String,
    #[serde(rename = "timestamp")]
    pub occurred_at: DateTime<Utc>,
    /// Track id, or 0 when the detector did not track the object
    #[serde(rename = "person_id")]
    pub track_or_person_id: i64,
    pub confidence: f32,
    pub camera_name: String,
    pub image_path: Option<String>,
    pub alert_sent: bool,
    pub bbox_x1: f32,
    pub bbox_y1: f32,
    pub bbox_x2: f32,
    pub bbox_y2: f32,
    pub metadata: EventMetadata,
}

impl DetectionEvent {
    pub fn builder(camera_id: impl Into<String>, camera_name: impl Into<String>) -> DetectionEventBuilder {
        DetectionEventBuilder {
            camera_id: camera_id.into(),
            camera_name: camera_name.into(),
            occurred_at: Utc::now(),
            track_id: None,
            confidence: 0.0,
            bbox: BBox::new(0.0, 0.0, 0.0, 0.0),
            image_path: None,
            location: String::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Box in source frame coordinates
    pub fn bbox(&self) -> BBox {
        BBox::new(self.bbox_x1, self.bbox_y1, self.bbox_x2, self.bbox_y2)
    }
}

pub struct DetectionEventBuilder {
    camera_id: String,
    camera_name: String,
    occurred_at: DateTime<Utc>,
    track_id: Option<i64>,
    confidence: f32,
    bbox: BBox,
    image_path: Option<String>,
    location: String,
    extra: BTreeMap<String, serde_json::Value>,
}

impl DetectionEventBuilder {
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    pub fn track_id(mut self, track_id: Option<i64>) -> Self {
        self.track_id = track_id;
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Source-space bounding box
    pub fn bbox(mut self, bbox: BBox) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn image_path(mut self, path: Option<String>) -> Self {
        self.image_path = path;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn build(self) -> DetectionEvent {
        DetectionEvent {
            camera_id: self.camera_id,
            occurred_at: self.occurred_at,
            track_or_person_id: self.track_id.unwrap_or(0),
            confidence: self.confidence,
            camera_name: self.camera_name,
            image_path: self.image_path,
            alert_sent: false,
            bbox_x1: self.bbox.x1,
            bbox_y1: self.bbox.y1,
            bbox_x2: self.bbox.x2,
            bbox_y2: self.bbox.y2,
            metadata: EventMetadata {
                bbox: self.bbox.to_array(),
                location: self.location,
                extra: self.extra,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_wire_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let event = DetectionEvent::builder("cam1", "Front Door")
            .occurred_at(at)
            .track_id(Some(7))
            .confidence(0.9)
            .bbox(BBox::new(10.0, 20.0, 60.0, 120.0))
            .image_path(Some("cam1_t7_1714566600000.jpg".to_string()))
            .location("Lobby")
            .extra("track_id", serde_json::json!(7))
            .build();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["camera_id"], "cam1");
        assert_eq!(json["timestamp"], "2024-05-01T12:30:00Z");
        assert_eq!(json["person_id"], 7);
        assert_eq!(json["camera_name"], "Front Door");
        assert_eq!(json["alert_sent"], false);
        assert_eq!(json["bbox_x2"], 60.0);
        assert_eq!(json["metadata"]["bbox"], serde_json::json!([10.0, 20.0, 60.0, 120.0]));
        assert_eq!(json["metadata"]["location"], "Lobby");
        assert_eq!(json["metadata"]["track_id"], 7);
        assert!(json.get("occurred_at").is_none());
    }

    #[test]
    fn test_untracked_event_uses_zero_person_id() {
        let event = DetectionEvent::builder("cam2", "Yard").build();
        assert_eq!(event.track_or_person_id, 0);
        assert!(event.image_path.is_none());
        assert!(!event.alert_sent);
    }
}
