use crate::error::SourceError;
use crate::frame::BBox;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tracing::debug;

/// Neutral gray used for letterbox padding
pub const PAD_COLOR: Rgb<u8> = Rgb([114, 114, 114]);

/// Geometry mapping a source frame onto the detection canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
    pub src_width: u32,
    pub src_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    /// Size of the resized frame before padding
    pub resized_width: u32,
    pub resized_height: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl LetterboxParams {
    /// Derive letterbox geometry for a `src` frame on a `target` canvas.
    ///
    /// Wider sources fit the canvas width and are padded top and bottom;
    /// everything else fits the height and is padded left and right.
    pub fn compute(
        src_width: u32,
        src_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Self, SourceError> {
        if src_width == 0 || src_height == 0 {
            return Err(SourceError::InvalidFrame {
                details: format!("zero sized frame {}x{}", src_width, src_height),
            });
        }
        if target_width == 0 || target_height == 0 {
            return Err(SourceError::InvalidFrame {
                details: format!("zero sized canvas {}x{}", target_width, target_height),
            });
        }

        let src_ratio = src_width as f64 / src_height as f64;
        let target_ratio = target_width as f64 / target_height as f64;

        let (resized_width, resized_height, pad_x, pad_y) = if src_ratio > target_ratio {
            let new_h = ((target_width as f64 / src_ratio).round() as u32).clamp(1, target_height);
            (target_width, new_h, 0, (target_height - new_h) / 2)
        } else {
            let new_w = ((target_height as f64 * src_ratio).round() as u32).clamp(1, target_width);
            (new_w, target_height, (target_width - new_w) / 2, 0)
        };

        let scale = (target_width as f32 / src_width as f32)
            .min(target_height as f32 / src_height as f32);

        Ok(Self {
            src_width,
            src_height,
            target_width,
            target_height,
            resized_width,
            resized_height,
            scale,
            pad_x,
            pad_y,
        })
    }

    pub fn matches_source(&self, width: u32, height: u32) -> bool {
        self.src_width == width && self.src_height == height
    }

    /// Map a box from source coordinates into canvas coordinates
    pub fn letterbox_bbox(&self, bbox: &BBox) -> BBox {
        let px = self.pad_x as f32;
        let py = self.pad_y as f32;
        BBox::new(
            bbox.x1 * self.scale + px,
            bbox.y1 * self.scale + py,
            bbox.x2 * self.scale + px,
            bbox.y2 * self.scale + py,
        )
    }

    /// Map a box from canvas coordinates back into source coordinates
    pub fn unletterbox(&self, bbox: &BBox) -> BBox {
        let px = self.pad_x as f32;
        let py = self.pad_y as f32;
        BBox::new(
            (bbox.x1 - px) / self.scale,
            (bbox.y1 - py) / self.scale,
            (bbox.x2 - px) / self.scale,
            (bbox.y2 - py) / self.scale,
        )
    }
}

/// Resize `frame` per `params` and pad it onto a gray canvas
pub fn letterbox(frame: &RgbImage, params: &LetterboxParams) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(params.target_width, params.target_height, PAD_COLOR);

    if frame.dimensions() == (params.resized_width, params.resized_height) {
        imageops::replace(&mut canvas, frame, params.pad_x as i64, params.pad_y as i64);
    } else {
        let resized = imageops::resize(
            frame,
            params.resized_width,
            params.resized_height,
            FilterType::Triangle,
        );
        imageops::replace(&mut canvas, &resized, params.pad_x as i64, params.pad_y as i64);
    }

    canvas
}

/// Per-camera normalizer caching letterbox geometry between frames
#[derive(Debug)]
pub struct FrameNormalizer {
    target_width: u32,
    target_height: u32,
    params: Option<LetterboxParams>,
}

impl FrameNormalizer {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            params: None,
        }
    }

    /// Current cached geometry, if a frame has been normalized
    pub fn params(&self) -> Option<&LetterboxParams> {
        self.params.as_ref()
    }

    /// Letterbox a frame, re-deriving geometry when the source resolution changes
    pub fn normalize(
        &mut self,
        frame: &RgbImage,
    ) -> Result<(RgbImage, LetterboxParams), SourceError> {
        let (width, height) = frame.dimensions();

        let params = match self.params {
            Some(params) if params.matches_source(width, height) => params,
            previous => {
                let params =
                    LetterboxParams::compute(width, height, self.target_width, self.target_height)?;
                match previous {
                    Some(old) => debug!(
                        "Source resolution changed {}x{} -> {}x{}, recomputed letterbox",
                        old.src_width, old.src_height, width, height
                    ),
                    None => debug!(
                        "Letterbox for {}x{}: scale={:.4} pad=({}, {})",
                        width, height, params.scale, params.pad_x, params.pad_y
                    ),
                }
                self.params = Some(params);
                params
            }
        };

        Ok((letterbox(frame, &params), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &BBox, b: &BBox, tolerance: f32) {
        for (x, y) in a.to_array().iter().zip(b.to_array().iter()) {
            assert!((x - y).abs() <= tolerance, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_wide_source_pads_vertically() {
        let params = LetterboxParams::compute(1920, 1080, 640, 480).unwrap();
        assert_eq!(params.resized_width, 640);
        assert_eq!(params.resized_height, 360);
        assert_eq!(params.pad_x, 0);
        assert_eq!(params.pad_y, 60);
        assert!((params.scale - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_tall_source_pads_horizontally() {
        let params = LetterboxParams::compute(480, 640, 640, 480).unwrap();
        assert_eq!(params.resized_width, 360);
        assert_eq!(params.resized_height, 480);
        assert_eq!(params.pad_x, 140);
        assert_eq!(params.pad_y, 0);
        assert!((params.scale - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_zero_sized_frame_rejected() {
        assert!(LetterboxParams::compute(0, 480, 640, 480).is_err());
        assert!(LetterboxParams::compute(640, 0, 640, 480).is_err());
    }

    #[test]
    fn test_bbox_round_trip() {
        for (w, h) in [(1920, 1080), (480, 640), (640, 480), (1280, 1024), (333, 777)] {
            let params = LetterboxParams::compute(w, h, 640, 480).unwrap();
            let original = BBox::new(12.5, 40.0, w as f32 * 0.6, h as f32 * 0.9);
            let back = params.unletterbox(&params.letterbox_bbox(&original));
            assert_close(&back, &original, 1e-2);
        }
    }

    #[test]
    fn test_letterbox_canvas_padding() {
        let frame = RgbImage::from_pixel(1920, 1080, Rgb([255, 0, 0]));
        let params = LetterboxParams::compute(1920, 1080, 640, 480).unwrap();
        let canvas = letterbox(&frame, &params);

        assert_eq!(canvas.dimensions(), (640, 480));
        assert_eq!(*canvas.get_pixel(320, 10), PAD_COLOR);
        assert_eq!(*canvas.get_pixel(320, 470), PAD_COLOR);
        assert_eq!(*canvas.get_pixel(320, 240), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_normalizer_recomputes_on_resolution_change() {
        let mut normalizer = FrameNormalizer::new(640, 480);

        let (_, first) = normalizer
            .normalize(&RgbImage::new(1920, 1080))
            .unwrap();
        assert_eq!(first.pad_y, 60);

        let (canvas, second) = normalizer.normalize(&RgbImage::new(480, 640)).unwrap();
        assert_eq!(canvas.dimensions(), (640, 480));
        assert_eq!(second.pad_x, 140);
        assert_eq!(normalizer.params(), Some(&second));
    }
}
