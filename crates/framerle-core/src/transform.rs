use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use imageproc::contrast::otsu_level;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("cannot transform an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("target size must be > 0")]
    ZeroTargetSize,
}

/// Reduces a decoded frame to a square black/white bitmap.
#[derive(Debug, Clone, Copy)]
pub struct FrameTransform {
    size: u32,
}

impl FrameTransform {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Resize to `size`x`size`, convert to grayscale, then binarize to {0, 255}
    /// with an Otsu threshold.
    pub fn apply(&self, image: &RgbImage) -> Result<GrayImage, TransformError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyImage { width, height });
        }
        if self.size == 0 {
            return Err(TransformError::ZeroTargetSize);
        }

        let resized = imageops::resize(image, self.size, self.size, FilterType::Triangle);
        let mut gray = imageops::grayscale(&resized);

        let level = otsu_level(&gray);
        for pixel in gray.pixels_mut() {
            pixel.0[0] = if pixel.0[0] > level { 255 } else { 0 };
        }

        Ok(gray)
    }
}
