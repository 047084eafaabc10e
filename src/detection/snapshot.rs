use crate::config::SnapshotConfig;
use crate::detector::encode_jpeg;
use crate::error::SnapshotError;
use crate::frame::BBox;
use chrono::{DateTime, Utc};
use image::{imageops, RgbImage};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Writes JPEG crops of detections into a flat directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    directory: PathBuf,
    jpeg_quality: u8,
}

impl SnapshotStore {
    pub fn new(directory: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            directory: directory.into(),
            jpeg_quality,
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(&config.directory, config.jpeg_quality)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the snapshot directory if needed
    pub async fn ensure_directory(&self) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| SnapshotError::Write {
                path: self.directory.display().to_string(),
                source,
            })
    }

    /// `{camera_id}[_t{track_id}]_{epoch_millis}.jpg`
    pub fn file_name(camera_id: &str, track_id: Option<i64>, at: DateTime<Utc>) -> String {
        let camera_id: String = camera_id
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        match track_id {
            Some(track) => format!("{}_t{}_{}.jpg", camera_id, track, at.timestamp_millis()),
            None => format!("{}_{}.jpg", camera_id, at.timestamp_millis()),
        }
    }

    /// Crop `frame` to `bbox` and persist it, returning the file name.
    ///
    /// The box is clamped to the frame; if nothing remains the full frame is
    /// saved instead.
    pub async fn save(
        &self,
        camera_id: &str,
        track_id: Option<i64>,
        frame: &RgbImage,
        bbox: &BBox,
        at: DateTime<Utc>,
    ) -> Result<String, SnapshotError> {
        let crop = match bbox.clamp_to(frame.width(), frame.height()) {
            Some((x, y, w, h)) => imageops::crop_imm(frame, x, y, w, h).to_image(),
            None => frame.clone(),
        };

        let bytes = encode_jpeg(&crop, self.jpeg_quality)?;
        let file_name = Self::file_name(camera_id, track_id, at);
        let path = self.directory.join(&file_name);

        fs::write(&path, &bytes)
            .await
            .map_err(|source| SnapshotError::Write {
                path: path.display().to_string(),
                source,
            })?;

        debug!(
            "Saved {}x{} snapshot {} ({} bytes)",
            crop.width(),
            crop.height(),
            file_name,
            bytes.len()
        );
        Ok(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_714_566_600_123).unwrap()
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            SnapshotStore::file_name("cam1", Some(7), at()),
            "cam1_t7_1714566600123.jpg"
        );
        assert_eq!(
            SnapshotStore::file_name("cam1", None, at()),
            "cam1_1714566600123.jpg"
        );
        assert_eq!(
            SnapshotStore::file_name("site/cam", None, at()),
            "site_cam_1714566600123.jpg"
        );
    }

    #[tokio::test]
    async fn test_save_crops_to_bbox() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), 90);
        let frame = RgbImage::new(200, 100);

        let name = store
            .save("cam1", Some(3), &frame, &BBox::new(10.0, 20.0, 60.0, 80.0), at())
            .await
            .unwrap();

        let saved = image::open(dir.path().join(&name)).unwrap();
        assert_eq!((saved.width(), saved.height()), (50, 60));
    }

    #[tokio::test]
    async fn test_empty_crop_falls_back_to_full_frame() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), 90);
        let frame = RgbImage::new(64, 48);

        let name = store
            .save("cam1", None, &frame, &BBox::new(500.0, 500.0, 600.0, 600.0), at())
            .await
            .unwrap();

        let saved = image::open(dir.path().join(&name)).unwrap();
        assert_eq!((saved.width(), saved.height()), (64, 48));
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("missing"), 90);
        let result = store
            .save("cam1", None, &RgbImage::new(8, 8), &BBox::new(0.0, 0.0, 4.0, 4.0), at())
            .await;
        assert!(matches!(result, Err(SnapshotError::Write { .. })));

        store.ensure_directory().await.unwrap();
        assert!(store.directory().exists());
    }
}
