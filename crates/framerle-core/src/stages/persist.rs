use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{select, Receiver};
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownSignal;
use crate::stages::{FrameFailure, PipelineStats, WorkerReport};
use crate::store::FrameStore;
use crate::video::frame::EncodedFrame;

/// Writes encoded frames to the store, one transaction per frame.
pub struct Persister {
    store: FrameStore,
    input: Receiver<EncodedFrame>,
    shutdown: ShutdownSignal,
    stats: Arc<PipelineStats>,
}

impl Persister {
    pub fn new(
        store: FrameStore,
        input: Receiver<EncodedFrame>,
        shutdown: ShutdownSignal,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            store,
            input,
            shutdown,
            stats,
        }
    }

    /// Worker loop. Exits when the input channel is closed and drained, or on
    /// shutdown. Fails only if the worker cannot open its own connection.
    pub fn run(&self, worker: usize) -> Result<WorkerReport> {
        let mut writer = self
            .store
            .connect()
            .with_context(|| format!("persistence worker {worker} cannot connect"))?;
        let mut report = WorkerReport {
            worker,
            ..WorkerReport::default()
        };
        debug!(worker, "persistence worker started");

        loop {
            let frame = select! {
                recv(self.input) -> msg => match msg {
                    Ok(frame) => frame,
                    Err(_) => break,
                },
                recv(self.shutdown.receiver()) -> _ => break,
            };

            match writer.insert(&frame) {
                Ok(id) => {
                    debug!(
                        worker,
                        id,
                        video = %frame.video_name,
                        frame_number = frame.frame_number,
                        "write frame to database"
                    );
                    self.stats.persisted();
                    report.completed += 1;
                }
                Err(e) => {
                    let failure = FrameFailure::Persist {
                        video_name: frame.video_name,
                        frame_number: frame.frame_number,
                        reason: format!("{e:#}"),
                    };
                    warn!(worker, error = %failure, "frame not persisted");
                    self.stats.persist_failed();
                    report.failed += 1;
                }
            }
        }

        info!(
            worker,
            persisted = report.completed,
            failed = report.failed,
            "persistence worker finished"
        );
        Ok(report)
    }
}
