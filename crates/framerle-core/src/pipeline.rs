use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::bounded;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::pool::WorkerPool;
use crate::shutdown::{shutdown_pair, ShutdownTrigger};
use crate::stages::extract::{ExtractionReport, Extractor};
use crate::stages::persist::Persister;
use crate::stages::process::Processor;
use crate::stages::{PipelineStats, StatsSnapshot, WorkerReport};
use crate::store::FrameStore;
use crate::video::files::list_videos;
use crate::video::frame::{EncodedFrame, RawFrame};
use crate::video::VideoSource;

/// Summary of a finished (or shut down) pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub extraction: ExtractionReport,
    pub processors: Vec<WorkerReport>,
    pub persisters: Vec<WorkerReport>,
    /// Persistence workers that could not start.
    pub persister_errors: Vec<String>,
    pub stats: StatsSnapshot,
}

impl PipelineReport {
    pub fn videos_found(&self) -> usize {
        self.extraction.videos.len()
    }
}

/// Running pipeline. All stages run on their own threads; dropping the handle
/// without calling [`PipelineHandle::wait`] requests shutdown.
pub struct PipelineHandle {
    trigger: ShutdownTrigger,
    extraction: JoinHandle<Result<ExtractionReport>>,
    processors: Vec<JoinHandle<WorkerReport>>,
    persisters: Vec<JoinHandle<Result<WorkerReport>>>,
    stats: Arc<PipelineStats>,
}

/// Start extraction, processing and persistence and return immediately.
///
/// Frames flow through two bounded channels of `channel_capacity`:
/// extraction -> processing -> persistence.
pub fn start(config: PipelineConfig, source: Arc<dyn VideoSource>) -> Result<PipelineHandle> {
    config.validate()?;

    let videos = list_videos(&config.input_dir)?;
    info!(
        count = videos.len(),
        dir = %config.input_dir.display(),
        "found video files to process"
    );

    let store = FrameStore::open(&config.database_path)?;
    if let Some(dir) = &config.debug_frames_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create debug frames directory {}", dir.display()))?;
        info!(?dir, "debug frames directory ready");
    }

    let (frames_tx, frames_rx) = bounded::<RawFrame>(config.channel_capacity);
    let (encoded_tx, encoded_rx) = bounded::<EncodedFrame>(config.channel_capacity);
    let (trigger, signal) = shutdown_pair();
    let stats = Arc::new(PipelineStats::default());

    // Each stage owns the only copies of its channel ends, so a stage finishing
    // closes the channel feeding the next one.
    let persister = Persister::new(store, encoded_rx, signal.clone(), stats.clone());
    let persisters = WorkerPool::new("persist", config.workers).spawn(move |i| persister.run(i))?;

    let processor = Processor::new(&config, frames_rx, encoded_tx, signal.clone(), stats.clone());
    let processors = WorkerPool::new("process", config.workers).spawn(move |i| processor.run(i))?;

    let extractor = Extractor::new(&config, source, frames_tx, signal, stats.clone());
    let extraction = thread::Builder::new()
        .name("extract".into())
        .spawn(move || extractor.run(videos))
        .context("failed to spawn extraction thread")?;

    info!(workers = config.workers, capacity = config.channel_capacity, "pipeline started");

    Ok(PipelineHandle {
        trigger,
        extraction,
        processors,
        persisters,
        stats,
    })
}

impl PipelineHandle {
    /// Live counters while the pipeline is running.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Block until every video is extracted and every frame has drained
    /// through processing and persistence.
    pub fn wait(self) -> Result<PipelineReport> {
        let PipelineHandle {
            trigger,
            extraction,
            processors,
            persisters,
            stats,
        } = self;

        let report = collect(extraction, processors, persisters, &stats);
        drop(trigger);
        report
    }

    /// Ask every stage to stop, then wait for the threads to exit. Frames still
    /// queued or in flight are dropped.
    pub fn shutdown(self) -> Result<PipelineReport> {
        let PipelineHandle {
            trigger,
            extraction,
            processors,
            persisters,
            stats,
        } = self;

        info!("shutdown requested");
        trigger.trigger();
        collect(extraction, processors, persisters, &stats)
    }
}

fn collect(
    extraction: JoinHandle<Result<ExtractionReport>>,
    processors: Vec<JoinHandle<WorkerReport>>,
    persisters: Vec<JoinHandle<Result<WorkerReport>>>,
    stats: &PipelineStats,
) -> Result<PipelineReport> {
    // Extraction errors are reported after the other stages are joined.
    let extraction = extraction
        .join()
        .map_err(|_| anyhow!("extraction thread panicked"))
        .and_then(|report| report.context("extraction failed"));

    let processors = processors
        .into_iter()
        .map(|h| h.join().map_err(|_| anyhow!("processing worker panicked")))
        .collect::<Result<Vec<_>>>()?;

    let mut persister_reports = Vec::new();
    let mut persister_errors = Vec::new();
    for handle in persisters {
        match handle
            .join()
            .map_err(|_| anyhow!("persistence worker panicked"))?
        {
            Ok(report) => persister_reports.push(report),
            Err(e) => {
                error!(error = %format!("{e:#}"), "persistence worker failed");
                persister_errors.push(format!("{e:#}"));
            }
        }
    }

    let extraction = extraction?;
    let stats = stats.snapshot();
    info!(
        frames_extracted = stats.frames_extracted,
        decode_failures = stats.decode_failures,
        frames_encoded = stats.frames_encoded,
        process_failures = stats.process_failures,
        frames_persisted = stats.frames_persisted,
        persist_failures = stats.persist_failures,
        "pipeline finished"
    );

    Ok(PipelineReport {
        extraction,
        processors,
        persisters: persister_reports,
        persister_errors,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::rle::decode;
    use crate::stages::extract::VideoStatus;
    use crate::testing::SyntheticSource;

    fn config_in(root: &Path) -> PipelineConfig {
        PipelineConfig {
            input_dir: root.join("in"),
            output_dir: root.join("out"),
            database_path: root.join("frames.db"),
            workers: 3,
            channel_capacity: 2,
            frame_size: 16,
            ..PipelineConfig::default()
        }
    }

    fn touch(dir: &Path, names: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        for name in names {
            fs::write(dir.join(name), b"").unwrap();
        }
    }

    #[test]
    #[traced_test]
    fn every_extracted_frame_is_persisted_once() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        touch(&config.input_dir, &["a.mp4", "b.mp4", "notes.txt"]);
        fs::create_dir_all(&config.output_dir).unwrap();

        let source = Arc::new(
            SyntheticSource::new()
                .with_video("a.mp4", 20)
                .with_video("b.mp4", 7),
        );
        let report = start(config.clone(), source).unwrap().wait().unwrap();

        // a: 3 * floor(20/3) = 18 frames, b: 3 * floor(7/3) = 6 frames.
        assert_eq!(report.videos_found(), 2);
        assert_eq!(report.extraction.relocated(), 2);
        assert_eq!(report.stats.frames_extracted, 24);
        assert_eq!(report.stats.frames_encoded, 24);
        assert_eq!(report.stats.frames_persisted, 24);
        assert_eq!(report.persisters.iter().map(|r| r.completed).sum::<u64>(), 24);

        let store = FrameStore::open(&config.database_path).unwrap();
        let a: Vec<u32> = store
            .records_for_video("a.mp4")
            .unwrap()
            .iter()
            .map(|r| r.frame_number)
            .collect();
        assert_eq!(a, (0..18).collect::<Vec<_>>());
        let b = store.records_for_video("b.mp4").unwrap();
        assert_eq!(b.len(), 6);
        for record in &b {
            assert_eq!(decode(&record.rle).unwrap().len(), 16 * 16);
        }

        assert!(config.output_dir.join("a.mp4").exists());
        assert!(config.output_dir.join("b.mp4").exists());
        assert!(config.input_dir.join("notes.txt").exists());
    }

    #[test]
    fn start_returns_while_stages_keep_running() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        touch(&config.input_dir, &["slow.mp4"]);
        fs::create_dir_all(&config.output_dir).unwrap();

        // 3 ranges of 100 frames at 2ms each keep extraction busy for ~200ms.
        let source = Arc::new(
            SyntheticSource::new()
                .with_video("slow.mp4", 300)
                .with_frame_delay(Duration::from_millis(2)),
        );
        let handle = start(config.clone(), source).unwrap();

        let early = handle.stats();
        assert!(early.frames_persisted < 300, "{early:?}");
        assert!(config.input_dir.join("slow.mp4").exists());

        let report = handle.wait().unwrap();
        assert_eq!(report.stats.frames_persisted, 300);
        assert_eq!(report.extraction.relocated(), 1);
        assert!(config.output_dir.join("slow.mp4").exists());
    }

    #[test]
    fn empty_input_directory_finishes_immediately() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        touch(&config.input_dir, &[]);

        let report = start(config, Arc::new(SyntheticSource::new()))
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(report.videos_found(), 0);
        assert_eq!(report.stats, StatsSnapshot::default());
        assert_eq!(report.processors.len(), 3);
        assert_eq!(report.persisters.len(), 3);
    }

    #[test]
    fn invalid_config_is_rejected_before_start() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            workers: 0,
            ..config_in(root.path())
        };
        touch(&config.input_dir, &[]);

        assert!(start(config, Arc::new(SyntheticSource::new())).is_err());
    }

    #[test]
    fn missing_input_directory_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        assert!(start(config, Arc::new(SyntheticSource::new())).is_err());
    }

    #[test]
    fn reprocessing_after_failed_relocation_duplicates_rows() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        touch(&config.input_dir, &["a.mp4"]);
        // No output directory: the move fails and the video stays put.

        let source = Arc::new(SyntheticSource::new().with_video("a.mp4", 6));

        let first = start(config.clone(), source.clone()).unwrap().wait().unwrap();
        assert_eq!(first.extraction.relocation_failures(), 1);
        assert!(config.input_dir.join("a.mp4").exists());

        let second = start(config.clone(), source).unwrap().wait().unwrap();
        assert!(matches!(
            second.extraction.videos[0].status,
            VideoStatus::RelocationFailed(_)
        ));

        let store = FrameStore::open(&config.database_path).unwrap();
        let records = store.records_for_video("a.mp4").unwrap();
        assert_eq!(records.len(), 12);

        let mut keys: Vec<(String, u32)> = records
            .iter()
            .map(|r| (r.video_name.clone(), r.frame_number))
            .collect();
        keys.dedup();
        assert_eq!(keys.len(), 6, "each (video, frame) pair appears twice");

        let mut ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn shutdown_stops_a_long_run() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        touch(&config.input_dir, &["long.mp4"]);
        fs::create_dir_all(&config.output_dir).unwrap();

        let source = Arc::new(
            SyntheticSource::new()
                .with_video("long.mp4", 30_000)
                .with_frame_delay(Duration::from_millis(1)),
        );
        let handle = start(config.clone(), source).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let report = handle.shutdown().unwrap();

        assert!(matches!(
            report.extraction.videos[0].status,
            VideoStatus::Cancelled
        ));
        assert!(report.stats.frames_extracted < 30_000);
        assert!(report.stats.frames_persisted <= report.stats.frames_extracted);
        assert!(config.input_dir.join("long.mp4").exists());
    }
}
