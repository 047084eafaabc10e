use super::{CaptureHints, FrameStream};
use crate::error::SourceError;
use image::{Rgb, RgbImage};
use std::time::{Duration, Instant};
use tracing::debug;

pub const SYNTHETIC_SCHEME: &str = "synthetic://";

/// Test pattern stream for `synthetic://WIDTHxHEIGHT` URIs.
///
/// Produces a gray frame with a vertical bar sweeping across it, paced at the
/// requested frame rate.
pub struct PatternSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_frame_at: Option<Instant>,
    frame_count: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32, target_fps: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(1000 / target_fps.max(1) as u64),
            next_frame_at: None,
            frame_count: 0,
        }
    }

    pub fn from_uri(uri: &str, hints: &CaptureHints) -> Result<Self, SourceError> {
        let spec = uri
            .strip_prefix(SYNTHETIC_SCHEME)
            .ok_or_else(|| SourceError::Unsupported {
                uri: uri.to_string(),
            })?;

        let (width, height) = parse_dimensions(spec).ok_or_else(|| SourceError::Open {
            uri: uri.to_string(),
            details: "expected synthetic://WIDTHxHEIGHT".to_string(),
        })?;

        debug!(
            "Opened synthetic source {}x{} @ {}fps",
            width, height, hints.target_fps
        );

        Ok(Self::new(width, height, hints.target_fps))
    }

    fn render(&self) -> RgbImage {
        let bar_width = (self.width / 16).max(1);
        let bar_x = ((self.frame_count * 8) % self.width as u64) as u32;
        let shade = (self.frame_count % 64) as u8;

        RgbImage::from_fn(self.width, self.height, |x, _| {
            if x >= bar_x && x < bar_x.saturating_add(bar_width) {
                Rgb([230, 230, 230])
            } else {
                Rgb([40 + shade, 40 + shade, 40 + shade])
            }
        })
    }
}

impl FrameStream for PatternSource {
    fn is_opened(&self) -> bool {
        true
    }

    fn read(&mut self) -> Result<RgbImage, SourceError> {
        if let Some(deadline) = self.next_frame_at {
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        self.next_frame_at = Some(Instant::now() + self.frame_interval);

        let frame = self.render();
        self.frame_count += 1;
        Ok(frame)
    }
}

fn parse_dimensions(spec: &str) -> Option<(u32, u32)> {
    let spec = spec.split(['?', '/']).next()?;
    let (w, h) = spec.split_once(['x', 'X'])?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}
