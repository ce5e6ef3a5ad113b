use image::{GrayImage, RgbImage};

/// A decoded video frame on its way from extraction to the transform step.
pub struct RawFrame {
    /// File name of the source video (e.g. `clip.mp4`).
    pub video_name: String,
    /// Absolute frame number from the start of the source (0-based).
    pub frame_number: u32,
    /// Presentation time in milliseconds, rendered as text.
    pub timestamp: String,
    /// The frame's image data.
    pub image: RgbImage,
}

/// A frame whose bitmap has been binarized and run-length encoded.
///
/// Only [`RawFrame::into_encoded`] builds one, so persistence never sees a
/// frame without an encoding.
pub struct EncodedFrame {
    pub video_name: String,
    pub frame_number: u32,
    pub timestamp: String,
    /// Binarized bitmap the encoding was produced from.
    pub bitmap: GrayImage,
    rle: String,
}

impl RawFrame {
    /// Replace the raw image with its transformed bitmap and attach the encoding.
    pub fn into_encoded(self, bitmap: GrayImage, rle: String) -> EncodedFrame {
        EncodedFrame {
            video_name: self.video_name,
            frame_number: self.frame_number,
            timestamp: self.timestamp,
            bitmap,
            rle,
        }
    }
}

impl EncodedFrame {
    pub fn rle(&self) -> &str {
        &self.rle
    }
}

/// Render milliseconds the way they are stored: shortest round-tripping decimal.
pub fn format_timestamp_ms(ms: f64) -> String {
    format!("{ms}")
}
