use super::{CaptureHints, FrameStream};
use crate::error::SourceError;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Outcome of the one-time `gstreamer::init`, kept so later opens see a failure too
static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();

fn ensure_initialized() -> Result<(), SourceError> {
    init_result(&GST_INIT, || gstreamer::init().map_err(|e| e.to_string()))
}

fn init_result<F>(cell: &OnceLock<Result<(), String>>, init: F) -> Result<(), SourceError>
where
    F: FnOnce() -> Result<(), String>,
{
    cell.get_or_init(init)
        .clone()
        .map_err(|details| SourceError::Open {
            uri: String::new(),
            details: format!("Failed to initialize GStreamer: {}", details),
        })
}

/// URI stream decoded by GStreamer into RGB frames
pub struct GstFrameStream {
    uri: String,
    pipeline: Pipeline,
    appsink: AppSink,
    read_timeout: ClockTime,
}

impl GstFrameStream {
    pub fn open(uri: &str, hints: &CaptureHints) -> Result<Self, SourceError> {
        ensure_initialized()?;

        let pipeline_desc = build_pipeline_string(uri, hints);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| SourceError::Open {
                uri: uri.to_string(),
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| SourceError::Open {
                uri: uri.to_string(),
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| SourceError::Open {
                uri: uri.to_string(),
                details: "Pipeline has no appsink".to_string(),
            })?;

        apply_transport_options(&pipeline, &hints.options);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| SourceError::Open {
                uri: uri.to_string(),
                details: format!("Failed to start pipeline: {}", e),
            })?;

        Ok(Self {
            uri: uri.to_string(),
            pipeline,
            appsink,
            read_timeout: ClockTime::from_mseconds(hints.read_timeout.as_millis() as u64),
        })
    }

    fn sample_to_image(&self, sample: gstreamer::Sample) -> Result<RgbImage, SourceError> {
        let buffer = sample.buffer().ok_or_else(|| SourceError::Read {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| SourceError::Read {
            details: "No caps in sample".to_string(),
        })?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| SourceError::Read {
            details: format!("Failed to get video info: {}", e),
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        let map = buffer.map_readable().map_err(|e| SourceError::Read {
            details: format!("Failed to map buffer: {}", e),
        })?;
        let data = map.as_slice();

        if height == 0 || stride < row_bytes || data.len() < stride * (height as usize - 1) + row_bytes {
            return Err(SourceError::InvalidFrame {
                details: format!(
                    "buffer of {} bytes too small for {}x{} (stride {})",
                    data.len(),
                    width,
                    height,
                    stride
                ),
            });
        }

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        RgbImage::from_raw(width, height, pixels).ok_or_else(|| SourceError::InvalidFrame {
            details: format!("pixel buffer does not match {}x{}", width, height),
        })
    }
}

impl FrameStream for GstFrameStream {
    fn is_opened(&self) -> bool {
        let (_, current, _) = self.pipeline.state(ClockTime::ZERO);
        current == gstreamer::State::Playing || current == gstreamer::State::Paused
    }

    fn read(&mut self) -> Result<RgbImage, SourceError> {
        match self.appsink.try_pull_sample(self.read_timeout) {
            Some(sample) => self.sample_to_image(sample),
            None if self.appsink.is_eos() => Err(SourceError::EndOfStream),
            None => Err(SourceError::Timeout {
                timeout: std::time::Duration::from_millis(self.read_timeout.mseconds()),
            }),
        }
    }
}

impl Drop for GstFrameStream {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop pipeline for {}: {}", self.uri, e);
        } else {
            debug!("Released pipeline for {}", self.uri);
        }
    }
}

fn build_pipeline_string(uri: &str, hints: &CaptureHints) -> String {
    format!(
        "uridecodebin name=src uri=\"{}\" ! \
         videoconvert ! videorate ! \
         video/x-raw,format=RGB,framerate={}/1 ! \
         appsink name=sink sync=false max-buffers={} drop=true enable-last-sample=false",
        uri.replace('"', "%22"),
        hints.target_fps,
        hints.buffer_size
    )
}

/// Forward "key;value" transport options onto the source element when it
/// exposes a matching property (e.g. `latency` on rtspsrc).
fn apply_transport_options(pipeline: &Pipeline, options: &[(String, String)]) {
    if options.is_empty() {
        return;
    }

    let Some(src) = pipeline.by_name("src") else {
        return;
    };

    let options = options.to_vec();
    src.connect("source-setup", false, move |values| {
        if let Some(Ok(source)) = values.get(1).map(|v| v.get::<gstreamer::Element>()) {
            for (key, value) in &options {
                if source.find_property(key).is_some() {
                    source.set_property_from_str(key, value);
                } else {
                    debug!("Source element has no property '{}', ignoring", key);
                }
            }
        }
        None
    });
}
