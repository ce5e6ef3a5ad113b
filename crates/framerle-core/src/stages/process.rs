use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::debug::DebugWriter;
use crate::rle;
use crate::shutdown::ShutdownSignal;
use crate::stages::{FrameFailure, PipelineStats, WorkerReport};
use crate::transform::FrameTransform;
use crate::video::frame::{EncodedFrame, RawFrame};

/// Turns raw frames into run-length encoded bitmaps.
pub struct Processor {
    transform: FrameTransform,
    max_run_bits: u32,
    binarize_threshold: u8,
    debug: Option<DebugWriter>,
    input: Receiver<RawFrame>,
    output: Sender<EncodedFrame>,
    shutdown: ShutdownSignal,
    stats: Arc<PipelineStats>,
}

impl Processor {
    pub fn new(
        config: &PipelineConfig,
        input: Receiver<RawFrame>,
        output: Sender<EncodedFrame>,
        shutdown: ShutdownSignal,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            transform: FrameTransform::new(config.frame_size),
            max_run_bits: config.max_run_bits,
            binarize_threshold: config.binarize_threshold,
            debug: config.debug_frames_dir.as_ref().map(DebugWriter::new),
            input,
            output,
            shutdown,
            stats,
        }
    }

    /// Resize + binarize the frame, then encode its bitmap.
    pub fn process(&self, frame: RawFrame) -> Result<EncodedFrame, FrameFailure> {
        let bitmap = self
            .transform
            .apply(&frame.image)
            .map_err(|source| FrameFailure::Transform {
                video_name: frame.video_name.clone(),
                frame_number: frame.frame_number,
                source,
            })?;

        // Second, fixed-threshold pass; a no-op on the {0, 255} transform output.
        let bits = rle::binarize(&bitmap, self.binarize_threshold);
        let encoded = rle::encode(bits, self.max_run_bits).map_err(|source| {
            FrameFailure::Encode {
                video_name: frame.video_name.clone(),
                frame_number: frame.frame_number,
                source,
            }
        })?;

        Ok(frame.into_encoded(bitmap, encoded))
    }

    /// Worker loop. Exits when the input channel is closed and drained, when
    /// every persistence worker is gone, or on shutdown.
    pub fn run(&self, worker: usize) -> WorkerReport {
        let mut report = WorkerReport {
            worker,
            ..WorkerReport::default()
        };
        debug!(worker, "processing worker started");

        loop {
            let frame = select! {
                recv(self.input) -> msg => match msg {
                    Ok(frame) => frame,
                    Err(_) => break,
                },
                recv(self.shutdown.receiver()) -> _ => break,
            };

            debug!(
                worker,
                video = %frame.video_name,
                frame_number = frame.frame_number,
                "process frame"
            );

            let encoded = match self.process(frame) {
                Ok(encoded) => encoded,
                Err(failure) => {
                    warn!(worker, error = %failure, "frame dropped");
                    self.stats.process_failed();
                    report.failed += 1;
                    continue;
                }
            };

            if let Some(writer) = &self.debug {
                if let Err(e) = writer.save(&encoded) {
                    warn!(worker, error = %format!("{e:#}"), "failed to save debug frame");
                }
            }

            self.stats.encoded();
            report.completed += 1;

            let sent = select! {
                send(self.output, encoded) -> res => res.is_ok(),
                recv(self.shutdown.receiver()) -> _ => false,
            };
            if !sent {
                break;
            }
        }

        info!(
            worker,
            processed = report.completed,
            failed = report.failed,
            "processing worker finished"
        );
        report
    }
}
