pub mod extract;
pub mod persist;
pub mod process;

use std::io;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::rle::RleError;
use crate::transform::TransformError;

/// Why a single frame did not make it into the store.
#[derive(Debug, Error)]
pub enum FrameFailure {
    #[error("failed to decode frame {frame_number} of {video_name}: {reason}")]
    Decode {
        video_name: String,
        frame_number: u32,
        reason: String,
    },
    #[error("failed to transform frame {frame_number} of {video_name}: {source}")]
    Transform {
        video_name: String,
        frame_number: u32,
        #[source]
        source: TransformError,
    },
    #[error("failed to encode frame {frame_number} of {video_name}: {source}")]
    Encode {
        video_name: String,
        frame_number: u32,
        #[source]
        source: RleError,
    },
    #[error("failed to persist frame {frame_number} of {video_name}: {reason}")]
    Persist {
        video_name: String,
        frame_number: u32,
        reason: String,
    },
}

/// A fully extracted video could not be moved out of the input directory.
///
/// The file stays in place and will be picked up again by the next run.
#[derive(Debug, Error)]
#[error("failed to move {video_name} to {}", .destination.display())]
pub struct RelocationError {
    pub video_name: String,
    pub destination: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Split `[0, frame_count)` into `workers` contiguous ranges of
/// `frame_count / workers` frames each.
///
/// The `frame_count % workers` trailing frames belong to no range and are
/// never extracted. With fewer frames than workers, no range is produced.
pub fn partition(frame_count: u32, workers: usize) -> Vec<Range<u32>> {
    let workers = workers.max(1) as u32;
    let chunk = frame_count / workers;
    if chunk == 0 {
        return Vec::new();
    }
    (0..workers).map(|i| i * chunk..(i + 1) * chunk).collect()
}

/// Live counters updated by every stage.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_extracted: AtomicU64,
    decode_failures: AtomicU64,
    frames_encoded: AtomicU64,
    process_failures: AtomicU64,
    frames_persisted: AtomicU64,
    persist_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_extracted: u64,
    pub decode_failures: u64,
    pub frames_encoded: u64,
    /// Transform and encode failures.
    pub process_failures: u64,
    pub frames_persisted: u64,
    pub persist_failures: u64,
}

impl PipelineStats {
    pub(crate) fn extracted(&self) {
        self.frames_extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failed(&self, frames: u64) {
        self.decode_failures.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn process_failed(&self) {
        self.process_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn persisted(&self) {
        self.frames_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn persist_failed(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            process_failures: self.process_failures.load(Ordering::Relaxed),
            frames_persisted: self.frames_persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// What one long-running stage worker did before it exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub completed: u64,
    pub failed: u64,
}
