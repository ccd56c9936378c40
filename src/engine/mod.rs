// Encoding engine - independent of the display

pub mod cascade;
pub mod core;
pub mod dispatch;
pub mod hardware;
pub mod probe;
pub mod runner;
pub mod worker;

pub use cascade::{CascadeResolver, CascadeState, EngineContext, RunOptions, WorkerIdentity};
pub use core::*;
pub use dispatch::{
    DispatchConfig, Dispatcher, MAX_CPU_WORKERS, MAX_GPU_WORKERS, RunSummary,
};
pub use hardware::Capabilities;
pub use probe::{FfprobeProber, MediaInfo, ProbeError, Prober};
pub use runner::{Attempt, FfmpegTranscoder, Transcoder};
pub use worker::{JobQueue, Worker, WorkerMessage};
