mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::{GrayImage, Luma};
use prost::Message;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use framerle_core::config::PipelineConfig;
use framerle_core::pipeline;
use framerle_core::rle;
use framerle_core::store::FrameStore;
use framerle_core::video::decoder::FfmpegSource;
use framerle_proto::proto::StoredFrame;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        cli::Command::Run {
            input,
            output,
            workers,
            channel_capacity,
            frame_size,
            max_run_bits,
            debug_frames,
        } => {
            let config = PipelineConfig {
                input_dir: input,
                output_dir: output,
                database_path: cli.database,
                workers,
                channel_capacity,
                frame_size,
                max_run_bits,
                debug_frames_dir: debug_frames,
                ..PipelineConfig::default()
            };
            run(config)
        }
        cli::Command::Export { output, video } => {
            export(&cli.database, video.as_deref(), &output)
        }
        cli::Command::Render { id, output, size } => render(&cli.database, id, size, &output),
    }
}

/// Stdout at `RUST_LOG` (default info), plus a DEBUG file log when requested.
fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stdout = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, "debug.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(stdout).with(file).init();
    Ok(guard)
}

fn run(config: PipelineConfig) -> Result<()> {
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        database = %config.database_path.display(),
        workers = config.workers,
        "starting pipeline"
    );

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let handle = pipeline::start(config, Arc::new(FfmpegSource)).context("pipeline failed")?;
    let report = handle.wait()?;

    if report.videos_found() == 0 {
        warn!("no video files found");
    }
    for error in &report.persister_errors {
        warn!(%error, "persistence worker did not run");
    }

    info!(
        videos = report.videos_found(),
        relocated = report.extraction.relocated(),
        relocation_failures = report.extraction.relocation_failures(),
        frames_persisted = report.stats.frames_persisted,
        dropped = report.stats.decode_failures
            + report.stats.process_failures
            + report.stats.persist_failures,
        "run complete"
    );
    Ok(())
}

/// Serialize stored frames as length-delimited protobuf and write to file.
fn export(database: &Path, video: Option<&str>, output: &Path) -> Result<()> {
    let store = FrameStore::open(database)?;
    let records = match video {
        Some(name) => store.records_for_video(name)?,
        None => store.records()?,
    };
    info!(?output, frame_count = records.len(), "writing protobuf output");

    let mut buf = Vec::new();
    for record in records {
        StoredFrame::from(record)
            .encode_length_delimited(&mut buf)
            .context("failed to encode StoredFrame")?;
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).context("failed to create output directory")?;
    }

    std::fs::write(output, &buf)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(?output, bytes = buf.len(), "protobuf output written");
    Ok(())
}

fn render(database: &Path, id: i64, size: u32, output: &Path) -> Result<()> {
    let store = FrameStore::open(database)?;
    let Some(record) = store.record(id)? else {
        bail!("no stored frame with id {id}");
    };

    let expected = size as usize * size as usize;
    let bits = rle::decode_limited(&record.rle, expected)
        .with_context(|| format!("stored frame {id} has a malformed encoding"))?;
    if bits.len() != expected {
        bail!(
            "frame {id} decodes to {} pixels, expected {size}x{size} = {expected}",
            bits.len()
        );
    }

    let image = GrayImage::from_fn(size, size, |x, y| {
        let bit = bits[(y * size + x) as usize];
        Luma([if bit == 0 { 0 } else { 255 }])
    });
    image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(
        id,
        video = %record.video_name,
        frame_number = record.frame_number,
        ?output,
        "frame rendered"
    );
    Ok(())
}
