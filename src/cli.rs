use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plexopt")]
#[command(
    about = "Build Plex optimized versions (1080p/720p) with NVENC workers and CPU fallback",
    long_about = None
)]
pub struct Cli {
    /// Library root to scan (defaults to current directory)
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug-level logging in the tool log
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Overrides for config values; unset flags fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Overwrite existing optimized versions
    #[arg(long, global = true)]
    pub force: bool,

    /// Accelerated (NVENC) workers, at most 2
    #[arg(long, global = true, value_name = "N")]
    pub gpu_workers: Option<u32>,

    /// Software (libx264) workers, at most 1
    #[arg(long, global = true, value_name = "N")]
    pub cpu_workers: Option<u32>,

    /// Decoder threads per software encode
    #[arg(long, global = true, value_name = "N")]
    pub cpu_threads: Option<u32>,

    /// Filter threads for accelerated encodes that bypass the CPU budget
    #[arg(long, global = true, value_name = "N")]
    pub gpu_filter_threads: Option<u32>,

    /// Total CPU threads for decode/scale shared by accelerated workers
    #[arg(long, global = true, value_name = "N")]
    pub cpu_budget_for_gpu: Option<u32>,

    /// Try NVDEC + scale_cuda when available
    #[arg(long, global = true)]
    pub gpu_decode: bool,

    /// Status refresh interval in seconds (0.2-2.0)
    #[arg(long, global = true, value_name = "SECS")]
    pub refresh: Option<f64>,

    /// Directory for logs
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Always encode 720p from the original instead of the 1080p version
    #[arg(long, global = true)]
    pub no_cascade: bool,

    /// Plain text frames instead of the full-screen status board
    #[arg(long, global = true)]
    pub plain: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check ffmpeg/ffprobe and report NVENC / scale_cuda support
    CheckFfmpeg,

    /// List candidates above 1080p and how many were skipped
    Scan {
        /// Library root (defaults to the positional ROOT or current directory)
        root: Option<PathBuf>,
    },

    /// Print every planned ffmpeg command without running anything
    DryRun {
        /// Library root (defaults to the positional ROOT or current directory)
        root: Option<PathBuf>,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
