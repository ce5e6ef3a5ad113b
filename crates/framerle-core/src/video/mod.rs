pub mod decoder;
pub mod files;
pub mod frame;

use std::path::Path;

use anyhow::Result;
use image::RgbImage;

/// Stream properties needed to plan extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u32,
}

/// One frame as produced by a decoder, before it is tagged with its video.
pub struct DecodedFrame {
    pub image: RgbImage,
    /// Presentation time in milliseconds.
    pub timestamp_ms: f64,
}

/// Sequential reader over a video's frames, starting at some frame index.
pub trait FrameReader: Send {
    /// Decode the next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>>;
}

/// Opens videos for probing and positioned decoding.
///
/// Every call to [`VideoSource::open_at_frame`] must return an independent
/// handle, since range tasks of one video decode concurrently.
pub trait VideoSource: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoInfo>;

    /// Open a reader whose first returned frame is `start_frame`.
    fn open_at_frame(&self, path: &Path, start_frame: u32) -> Result<Box<dyn FrameReader>>;
}
