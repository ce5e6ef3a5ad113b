use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::video::frame::EncodedFrame;

/// Writes binarized frame bitmaps to a directory for visual inspection.
#[derive(Debug, Clone)]
pub struct DebugWriter {
    dir: PathBuf,
}

impl DebugWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Save the bitmap as `<video stem>_<frame number>.png`.
    pub fn save(&self, frame: &EncodedFrame) -> Result<PathBuf> {
        let stem = Path::new(&frame.video_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| frame.video_name.clone());
        let path = self
            .dir
            .join(format!("{stem}_{:08}.png", frame.frame_number));

        frame
            .bitmap
            .save(&path)
            .with_context(|| format!("failed to save debug frame to {}", path.display()))?;

        debug!(?path, "saved debug frame");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma, RgbImage};

    use super::*;
    use crate::video::frame::RawFrame;

    #[test]
    fn saves_named_png() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DebugWriter::new(dir.path());

        let bitmap = GrayImage::from_fn(4, 4, |x, _| Luma([if x < 2 { 0 } else { 255 }]));
        let frame = RawFrame {
            video_name: "clip.mp4".into(),
            frame_number: 12,
            timestamp: "480".into(),
            image: RgbImage::new(1, 1),
        }
        .into_encoded(bitmap.clone(), "2A2B2A2B2A2B2A2B".into());

        let path = writer.save(&frame).unwrap();
        assert_eq!(path, dir.path().join("clip_00000012.png"));

        let loaded = image::open(&path).unwrap().into_luma8();
        assert_eq!(loaded, bitmap);
    }
}
