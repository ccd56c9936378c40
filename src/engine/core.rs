mod budget;
mod cancel;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod log;
mod scan;
mod targets;
mod types;

pub use budget::{BudgetPlan, ThreadAllotment, allocate};
pub use cancel::CancelToken;
pub use ffmpeg_cmd::{
    BuildError, EncodePlan, EncodeRequest, VIDEO_CODEC_CPU, VIDEO_CODEC_GPU, build_encode_plan,
    format_ffmpeg_cmd,
};
pub use ffmpeg_info::{check_tools, ffmpeg_version, ffprobe_version};
pub use log::{AttemptLog, attempt_log_path, init_tracing, sanitize_filename};
pub use scan::{
    CandidateScan, TARGET_CONTAINER, VERSIONS_DIRNAME, build_job_queue, is_generated_output,
    is_video_file, output_path, scan, scan_streaming,
};
pub use targets::{
    BASELINE_HEIGHT, BASELINE_WIDTH, OPTIMIZED_720P, OPTIMIZED_1080P, TARGETS, Target, is_eligible,
};
pub use types::{
    AccelMode, AttemptResult, EncodedWith, Job, JobReport, ProgressSnapshot, TargetOutcome,
    TargetState,
};
