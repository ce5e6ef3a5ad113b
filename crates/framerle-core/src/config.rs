use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("workers must be >= 1")]
    NoWorkers,
    #[error("channel_capacity must be >= 1")]
    NoChannelCapacity,
    #[error("frame_size must be >= 1")]
    ZeroFrameSize,
    #[error("max_run_bits must be in 1..=32, got {0}")]
    MaxRunBits(u32),
}

/// Parameters shared by every pipeline stage. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory scanned for `.mp4` input files.
    pub input_dir: PathBuf,
    /// Directory a video is moved to once all its frames were extracted.
    pub output_dir: PathBuf,
    /// SQLite database file holding the `video_frames` table.
    pub database_path: PathBuf,
    /// Parallelism for videos, frame ranges, and both worker pools.
    pub workers: usize,
    /// Capacity of each bounded inter-stage channel.
    pub channel_capacity: usize,
    /// Edge length of the square bitmap each frame is resized to.
    pub frame_size: u32,
    /// Runs are capped at `2^max_run_bits - 1` pixels.
    pub max_run_bits: u32,
    /// Fixed threshold of the binarization pass in front of the encoder.
    pub binarize_threshold: u8,
    /// Directory to write binarized bitmaps as PNG, or None to skip.
    pub debug_frames_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("in"),
            output_dir: PathBuf::from("out"),
            database_path: PathBuf::from("frames.db"),
            workers: 3,
            channel_capacity: 64,
            frame_size: 200,
            max_run_bits: 8,
            binarize_threshold: 127,
            debug_frames_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::NoChannelCapacity);
        }
        if self.frame_size == 0 {
            return Err(ConfigError::ZeroFrameSize);
        }
        if !(1..=32).contains(&self.max_run_bits) {
            return Err(ConfigError::MaxRunBits(self.max_run_bits));
        }
        Ok(())
    }
}
