//! In-memory [`VideoSource`] used by stage and pipeline tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::{GrayImage, Rgb, RgbImage};

use crate::video::frame::{EncodedFrame, RawFrame};
use crate::video::{DecodedFrame, FrameReader, VideoInfo, VideoSource};

const WIDTH: u32 = 32;
const HEIGHT: u32 = 24;
const FPS: f64 = 25.0;

#[derive(Clone, Default)]
pub(crate) struct SyntheticSource {
    frame_counts: HashMap<String, u32>,
    failing_frames: HashSet<u32>,
    stream_end: Option<u32>,
    frame_delay: Option<Duration>,
}

impl SyntheticSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_video(mut self, name: &str, frame_count: u32) -> Self {
        self.frame_counts.insert(name.to_string(), frame_count);
        self
    }

    /// Frame numbers that fail to decode in every video.
    pub(crate) fn with_failing_frames(mut self, frames: impl IntoIterator<Item = u32>) -> Self {
        self.failing_frames.extend(frames);
        self
    }

    /// Streams end at this frame even if the probe reported more.
    pub(crate) fn with_stream_end(mut self, frame: u32) -> Self {
        self.stream_end = Some(frame);
        self
    }

    pub(crate) fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }

    fn frame_count(&self, path: &Path) -> Result<u32> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.frame_counts
            .get(&name)
            .copied()
            .ok_or_else(|| anyhow!("unknown video {name}"))
    }
}

/// Left part dark, right part bright; the split moves with the frame number.
pub(crate) fn test_image(frame_number: u32) -> RgbImage {
    let split = frame_number % WIDTH;
    RgbImage::from_fn(WIDTH, HEIGHT, |x, _| {
        if x < split {
            Rgb([20, 20, 20])
        } else {
            Rgb([230, 230, 230])
        }
    })
}

impl VideoSource for SyntheticSource {
    fn probe(&self, path: &Path) -> Result<VideoInfo> {
        Ok(VideoInfo {
            width: WIDTH,
            height: HEIGHT,
            fps: FPS,
            frame_count: self.frame_count(path)?,
        })
    }

    fn open_at_frame(&self, path: &Path, start_frame: u32) -> Result<Box<dyn FrameReader>> {
        let frame_count = self.frame_count(path)?;
        let end = self.stream_end.map_or(frame_count, |e| e.min(frame_count));
        Ok(Box::new(SyntheticReader {
            next: start_frame,
            end,
            failing: self.failing_frames.clone(),
            delay: self.frame_delay,
        }))
    }
}

struct SyntheticReader {
    next: u32,
    end: u32,
    failing: HashSet<u32>,
    delay: Option<Duration>,
}

impl FrameReader for SyntheticReader {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if self.next >= self.end {
            return Ok(None);
        }
        let n = self.next;
        self.next += 1;

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.failing.contains(&n) {
            return Err(anyhow!("corrupt packet at frame {n}"));
        }

        Ok(Some(DecodedFrame {
            image: test_image(n),
            timestamp_ms: f64::from(n) * 1000.0 / FPS,
        }))
    }
}

/// An already-encoded frame with a 40ms frame interval timestamp.
pub(crate) fn encoded(video: &str, frame_number: u32, rle: &str) -> EncodedFrame {
    RawFrame {
        video_name: video.into(),
        frame_number,
        timestamp: format!("{}", frame_number * 40),
        image: RgbImage::new(1, 1),
    }
    .into_encoded(GrayImage::new(1, 1), rle.into())
}
