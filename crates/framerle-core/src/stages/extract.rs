use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::{select, Sender};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::pool::WorkerPool;
use crate::shutdown::ShutdownSignal;
use crate::stages::{partition, FrameFailure, PipelineStats, RelocationError};
use crate::video::files::move_file;
use crate::video::frame::{format_timestamp_ms, RawFrame};
use crate::video::VideoSource;

/// Where a video ended up after extraction.
#[derive(Debug)]
pub enum VideoStatus {
    /// Every range finished and the file was moved to the output directory.
    Relocated,
    /// The video could not be opened or probed; it stays in the input directory.
    ProbeFailed(String),
    /// Frames were extracted but the move failed; the file stays in place.
    RelocationFailed(RelocationError),
    /// Shutdown was requested before all ranges finished.
    Cancelled,
}

#[derive(Debug)]
pub struct VideoOutcome {
    pub video_name: String,
    pub frames_extracted: u64,
    pub decode_failures: u64,
    pub status: VideoStatus,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub videos: Vec<VideoOutcome>,
}

impl ExtractionReport {
    pub fn relocated(&self) -> usize {
        self.videos
            .iter()
            .filter(|v| matches!(v.status, VideoStatus::Relocated))
            .count()
    }

    pub fn relocation_failures(&self) -> usize {
        self.videos
            .iter()
            .filter(|v| matches!(v.status, VideoStatus::RelocationFailed(_)))
            .count()
    }
}

#[derive(Debug, Default)]
struct RangeOutcome {
    extracted: u64,
    failed: u64,
    cancelled: bool,
}

/// Decodes videos into [`RawFrame`]s and feeds them to the processing channel.
///
/// Videos are spread over a pool of `workers` threads; each video is split into
/// `workers` frame ranges decoded by a second pool of the same size.
pub struct Extractor {
    config: PipelineConfig,
    source: Arc<dyn VideoSource>,
    frames: Sender<RawFrame>,
    shutdown: ShutdownSignal,
    stats: Arc<PipelineStats>,
}

impl Extractor {
    pub fn new(
        config: &PipelineConfig,
        source: Arc<dyn VideoSource>,
        frames: Sender<RawFrame>,
        shutdown: ShutdownSignal,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            config: config.clone(),
            source,
            frames,
            shutdown,
            stats,
        }
    }

    /// Extract every listed video. Returns when all of them are done (or
    /// cancelled); dropping the extractor afterwards closes the frame channel.
    pub fn run(&self, videos: Vec<String>) -> Result<ExtractionReport> {
        let pool = WorkerPool::new("extract", self.config.workers);
        let videos = pool
            .map(videos, |video| self.extract_video(video))?
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let report = ExtractionReport { videos };
        info!(
            videos = report.videos.len(),
            relocated = report.relocated(),
            relocation_failures = report.relocation_failures(),
            "extraction finished"
        );
        Ok(report)
    }

    fn extract_video(&self, video_name: String) -> Result<VideoOutcome> {
        let path = self.config.input_dir.join(&video_name);
        info!(video = %video_name, "extracting frames");

        let mut outcome = VideoOutcome {
            video_name,
            frames_extracted: 0,
            decode_failures: 0,
            status: VideoStatus::Cancelled,
        };

        let info = match self.source.probe(&path) {
            Ok(info) => info,
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(video = %outcome.video_name, %reason, "failed to probe video, leaving it in place");
                outcome.status = VideoStatus::ProbeFailed(reason);
                return Ok(outcome);
            }
        };

        let ranges = partition(info.frame_count, self.config.workers);
        let covered: u32 = ranges.iter().map(|r| r.end - r.start).sum();
        if covered < info.frame_count {
            debug!(
                video = %outcome.video_name,
                frame_count = info.frame_count,
                skipped = info.frame_count - covered,
                "trailing frames fall outside the partition and are not extracted"
            );
        }

        let pool = WorkerPool::new(format!("range-{}", outcome.video_name), self.config.workers);
        let results = pool.map(ranges, |range| {
            self.extract_range(&path, &outcome.video_name, range)
        })?;

        let mut cancelled = false;
        for r in &results {
            outcome.frames_extracted += r.extracted;
            outcome.decode_failures += r.failed;
            cancelled |= r.cancelled;
        }

        if cancelled {
            info!(video = %outcome.video_name, "extraction cancelled, leaving video in place");
            return Ok(outcome);
        }

        let destination = self.config.output_dir.join(&outcome.video_name);
        outcome.status = match move_file(&path, &destination) {
            Ok(()) => {
                info!(
                    video = %outcome.video_name,
                    frames = outcome.frames_extracted,
                    decode_failures = outcome.decode_failures,
                    "extracting frames has been done"
                );
                VideoStatus::Relocated
            }
            Err(source) => {
                let err = RelocationError {
                    video_name: outcome.video_name.clone(),
                    destination,
                    source,
                };
                warn!(error = %err, "video stays in the input directory and will be reprocessed");
                VideoStatus::RelocationFailed(err)
            }
        };
        Ok(outcome)
    }

    /// Decode `range` sequentially from its own handle and forward each frame.
    fn extract_range(&self, path: &Path, video_name: &str, range: Range<u32>) -> RangeOutcome {
        debug!(video = video_name, start = range.start, end = range.end, "extracting range");
        let mut outcome = RangeOutcome::default();

        let mut reader = match self.source.open_at_frame(path, range.start) {
            Ok(reader) => reader,
            Err(e) => {
                let missing = u64::from(range.end - range.start);
                warn!(
                    video = video_name,
                    start = range.start,
                    end = range.end,
                    error = %format!("{e:#}"),
                    "failed to open decoder, range skipped"
                );
                self.stats.decode_failed(missing);
                outcome.failed = missing;
                return outcome;
            }
        };

        for frame_number in range.clone() {
            if self.shutdown.is_requested() {
                outcome.cancelled = true;
                break;
            }

            let decoded = match reader.next_frame() {
                Ok(Some(decoded)) => decoded,
                Ok(None) => {
                    let missing = u64::from(range.end - frame_number);
                    warn!(
                        video = video_name,
                        frame_number,
                        missing,
                        "stream ended before the range was complete"
                    );
                    self.stats.decode_failed(missing);
                    outcome.failed += missing;
                    break;
                }
                Err(e) => {
                    let failure = FrameFailure::Decode {
                        video_name: video_name.to_string(),
                        frame_number,
                        reason: format!("{e:#}"),
                    };
                    warn!(error = %failure, "frame skipped");
                    self.stats.decode_failed(1);
                    outcome.failed += 1;
                    continue;
                }
            };

            let frame = RawFrame {
                video_name: video_name.to_string(),
                frame_number,
                timestamp: format_timestamp_ms(decoded.timestamp_ms),
                image: decoded.image,
            };

            // Blocks while the channel is full; gives up on shutdown or when
            // every processor is gone.
            let sent = select! {
                send(self.frames, frame) -> res => res.is_ok(),
                recv(self.shutdown.receiver()) -> _ => false,
            };
            if !sent {
                outcome.cancelled = true;
                break;
            }

            self.stats.extracted();
            outcome.extracted += 1;
        }

        outcome
    }
}
