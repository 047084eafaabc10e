use crate::normalize::LetterboxParams;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Axis-aligned box as `[x1, y1, x2, y2]` in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Area in square pixels; inverted boxes have zero area.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Integer pixel rectangle `(x, y, w, h)` clamped to a `width` x `height`
    /// image. Returns `None` when nothing of the box lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.max(0.0).floor().min(width as f32) as u32;
        let y1 = self.y1.max(0.0).floor().min(height as f32) as u32;
        let x2 = self.x2.max(0.0).floor().min(width as f32) as u32;
        let y2 = self.y2.max(0.0).floor().min(height as f32) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        b.to_array()
    }
}

/// A captured frame travelling from the grabber thread to the detection task
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    /// Per-camera monotonic sequence number
    pub sequence: u64,
    /// Full resolution frame as delivered by the source
    pub original: RgbImage,
    /// Letterboxed frame at the detection canvas size
    pub normalized: RgbImage,
    /// Mapping between the two coordinate spaces
    pub params: LetterboxParams,
    /// Monotonic capture instant
    pub captured_at: Instant,
}

impl QueuedFrame {
    /// Age of the frame in milliseconds
    pub fn age_ms(&self) -> u64 {
        self.captured_at.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_area() {
        assert_eq!(BBox::new(0.0, 0.0, 50.0, 100.0).area(), 5000.0);
        assert_eq!(BBox::new(10.0, 10.0, 5.0, 20.0).area(), 0.0);
    }

    #[test]
    fn test_bbox_clamp() {
        let b = BBox::new(-20.0, 10.0, 50.5, 500.0);
        assert_eq!(b.clamp_to(100, 100), Some((0, 10, 50, 90)));

        let outside = BBox::new(200.0, 200.0, 300.0, 300.0);
        assert_eq!(outside.clamp_to(100, 100), None);
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let b = BBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1.0,2.0,3.0,4.0]");
        let parsed: BBox = serde_json::from_str("[1,2,3,4]").unwrap();
        assert_eq!(parsed, b);
    }
}
