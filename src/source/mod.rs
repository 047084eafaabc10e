//! Frame sources: the transport layer delivering decoded RGB frames.
//!
//! A [`FrameSourceFactory`] opens a URI into a [`FrameStream`]. Streams are
//! read from a dedicated grabber thread, so `read` is allowed to block for up
//! to the configured read timeout. Dropping a stream releases it.

mod pattern;

#[cfg(all(feature = "rtsp-gstreamer", target_os = "linux"))]
mod gst;

pub use pattern::{PatternSource, SYNTHETIC_SCHEME};

#[cfg(all(feature = "rtsp-gstreamer", target_os = "linux"))]
pub use gst::GstFrameStream;

use crate::config::CaptureConfig;
use crate::error::SourceError;
use image::RgbImage;
use std::time::Duration;

/// Capture hints passed to the transport when opening a stream
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureHints {
    /// Frames the transport may buffer before dropping
    pub buffer_size: u32,
    /// Requested output frame rate
    pub target_fps: u32,
    /// Upper bound on a single blocking read
    pub read_timeout: Duration,
    /// Opaque transport key/value options
    pub options: Vec<(String, String)>,
}

impl CaptureHints {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            buffer_size: config.buffer_size.max(1),
            target_fps: config.target_fps.max(1),
            read_timeout: config.read_timeout(),
            options: config.transport_option_pairs(),
        }
    }
}

impl Default for CaptureHints {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            target_fps: 15,
            read_timeout: Duration::from_secs(5),
            options: Vec::new(),
        }
    }
}

/// An open video stream. Released on drop.
pub trait FrameStream: Send {
    /// Whether the transport reports the stream as usable
    fn is_opened(&self) -> bool;

    /// Block until the next frame is decoded
    fn read(&mut self) -> Result<RgbImage, SourceError>;
}

/// Opens frame streams for camera URIs
pub trait FrameSourceFactory: Send + Sync {
    fn open(&self, uri: &str, hints: &CaptureHints) -> Result<Box<dyn FrameStream>, SourceError>;
}

/// Dispatches `synthetic://` URIs to the test pattern source and everything
/// else to GStreamer when the `rtsp-gstreamer` feature is enabled.
#[derive(Debug, Default)]
pub struct DefaultSourceFactory;

impl DefaultSourceFactory {
    pub fn new() -> Self {
        Self
    }
}

impl FrameSourceFactory for DefaultSourceFactory {
    fn open(&self, uri: &str, hints: &CaptureHints) -> Result<Box<dyn FrameStream>, SourceError> {
        if uri.starts_with(SYNTHETIC_SCHEME) {
            return Ok(Box::new(PatternSource::from_uri(uri, hints)?));
        }

        #[cfg(all(feature = "rtsp-gstreamer", target_os = "linux"))]
        {
            Ok(Box::new(GstFrameStream::open(uri, hints)?))
        }

        #[cfg(not(all(feature = "rtsp-gstreamer", target_os = "linux")))]
        {
            Err(SourceError::Unsupported {
                uri: uri.to_string(),
            })
        }
    }
}
