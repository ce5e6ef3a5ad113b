use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "framerle", about = "Extract video frames into run-length encoded bitmaps")]
pub struct Cli {
    /// SQLite database holding the `video_frames` table.
    #[arg(long, env = "FRAMES_DB", default_value = "frames.db", global = true)]
    pub database: PathBuf,

    /// Also write DEBUG-level logs to `<dir>/debug.log`.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process every .mp4 file in the input directory once.
    Run {
        /// Directory scanned for .mp4 files.
        #[arg(short, long, env = "DIR_IN", default_value = "in")]
        input: PathBuf,

        /// Directory finished videos are moved to.
        #[arg(short, long, env = "DIR_OUT", default_value = "out")]
        output: PathBuf,

        /// Parallelism for videos, frame ranges, and both worker pools.
        #[arg(short, long, default_value_t = 3)]
        workers: usize,

        /// Capacity of each inter-stage channel.
        #[arg(long, default_value_t = 64)]
        channel_capacity: usize,

        /// Edge length of the square bitmap frames are resized to.
        #[arg(long, default_value_t = 200)]
        frame_size: u32,

        /// Runs are capped at 2^bits - 1 pixels.
        #[arg(long, default_value_t = 8)]
        max_run_bits: u32,

        /// Directory to save binarized frames as PNG.
        #[arg(long)]
        debug_frames: Option<PathBuf>,
    },

    /// Write stored frames as length-delimited protobuf.
    Export {
        /// Path to write the output protobuf file.
        #[arg(short, long)]
        output: PathBuf,

        /// Only export frames of this video.
        #[arg(long)]
        video: Option<String>,
    },

    /// Decode one stored frame back into a black/white PNG.
    Render {
        /// Row id of the stored frame.
        #[arg(long)]
        id: i64,

        /// Path of the PNG to write.
        #[arg(short, long)]
        output: PathBuf,

        /// Edge length the frame was encoded at.
        #[arg(long, default_value_t = 200)]
        size: u32,
    },
}
