use super::budget::ThreadAllotment;
use super::scan::TARGET_CONTAINER;
use super::targets::Target;
use super::types::AccelMode;
use crate::engine::probe::MediaInfo;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

pub const VIDEO_CODEC_GPU: &str = "h264_nvenc";
pub const VIDEO_CODEC_CPU: &str = "libx264";
const VIDEO_PROFILE: &str = "high";
const VIDEO_LEVEL: &str = "4.1";
const AUDIO_CODEC: &str = "aac";
const AUDIO_BITRATE: &str = "192k";
const AUDIO_CHANNELS: u32 = 2;
const SUBTITLE_CODEC: &str = "mov_text";

/// libx264 CRF window; the target quality is clamped into it
const CRF_MIN: u32 = 16;
const CRF_MAX: u32 = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("no video stream to map in {0}")]
    NoVideoStream(String),

    #[error("target {0} has zero width or height")]
    InvalidGeometry(&'static str),
}

/// Everything needed to build one ffmpeg invocation.
#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
    pub target: &'a Target,
    pub mode: AccelMode,
    pub threads: ThreadAllotment,
    /// NVDEC decode + scale_cuda; only honoured in hardware mode
    pub full_gpu_pipeline: bool,
    pub media: &'a MediaInfo,
}

/// A ready-to-run ffmpeg invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodePlan {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub mode: AccelMode,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl EncodePlan {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run a different binary with the same arguments
    pub fn with_program(mut self, program: impl AsRef<OsStr>) -> Self {
        self.program = program.as_ref().to_os_string();
        self
    }

    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// Format an invocation as a shell-safe string for logs and dry runs
pub fn format_ffmpeg_cmd(plan: &EncodePlan) -> String {
    std::iter::once(plan.program.to_string_lossy().into_owned())
        .chain(plan.args_lossy())
        .map(|arg| match shlex::try_quote(&arg) {
            Ok(quoted) => quoted.into_owned(),
            Err(_) => format!("\"{}\"", arg),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn scale_filter(target: &Target, gpu_scale: bool) -> String {
    if gpu_scale {
        format!(
            "scale_cuda={}:{}:force_original_aspect_ratio=decrease",
            target.max_width, target.max_height
        )
    } else {
        format!(
            "scale={}:{}:force_original_aspect_ratio=decrease:force_divisible_by=2,setsar=1",
            target.max_width, target.max_height
        )
    }
}

fn push<I, S>(args: &mut Vec<OsString>, items: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.extend(items.into_iter().map(|s| s.as_ref().to_os_string()));
}

fn apply_threads(args: &mut Vec<OsString>, req: &EncodeRequest, gpu_pipeline: bool) {
    match req.mode {
        AccelMode::Hardware => {
            if gpu_pipeline {
                push(args, ["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
                return;
            }
            if let Some(n) = req.threads.filter {
                let n = n.to_string();
                push(args, ["-filter_threads", n.as_str(), "-filter_complex_threads", n.as_str()]);
            }
            if let Some(n) = req.threads.decoder.filter(|n| *n > 0) {
                push(args, ["-threads".to_string(), n.to_string()]);
            }
        }
        AccelMode::Software => {
            if let Some(n) = req.threads.decoder.filter(|n| *n > 0) {
                push(args, ["-threads".to_string(), n.to_string()]);
            }
        }
    }
}

fn apply_video_codec(args: &mut Vec<OsString>, req: &EncodeRequest, gpu_pipeline: bool) {
    let target = req.target;
    match req.mode {
        AccelMode::Hardware => {
            let cq = target.quality.to_string();
            push(
                args,
                [
                    "-c:v",
                    VIDEO_CODEC_GPU,
                    "-preset",
                    "p5",
                    "-rc:v",
                    "vbr_hq",
                    "-cq:v",
                    cq.as_str(),
                    "-b:v",
                    "0",
                    "-profile:v",
                    VIDEO_PROFILE,
                    "-level:v",
                    VIDEO_LEVEL,
                ],
            );
            // CUDA frames go straight into NVENC; a CPU pixel format would force a download
            if !gpu_pipeline {
                push(args, ["-pix_fmt", "yuv420p"]);
            }
        }
        AccelMode::Software => {
            let crf = target.quality.clamp(CRF_MIN, CRF_MAX).to_string();
            push(
                args,
                [
                    "-c:v",
                    VIDEO_CODEC_CPU,
                    "-preset",
                    "slow",
                    "-profile:v",
                    VIDEO_PROFILE,
                    "-level:v",
                    VIDEO_LEVEL,
                    "-maxrate",
                    target.max_bitrate,
                    "-bufsize",
                    target.buffer_size,
                    "-crf",
                    crf.as_str(),
                    "-pix_fmt",
                    "yuv420p",
                ],
            );
        }
    }
}

/// First audio stream only, re-encoded to stereo AAC
fn apply_audio(args: &mut Vec<OsString>, media: &MediaInfo) {
    if media.has_audio() {
        push(
            args,
            [
                "-map".to_string(),
                "0:a:0".to_string(),
                "-c:a:0".to_string(),
                AUDIO_CODEC.to_string(),
                "-b:a:0".to_string(),
                AUDIO_BITRATE.to_string(),
                "-ac:a:0".to_string(),
                AUDIO_CHANNELS.to_string(),
            ],
        );
    }
}

/// Text subtitles become mov_text, numbered sequentially; image subtitles are dropped
fn apply_subtitles(args: &mut Vec<OsString>, media: &MediaInfo) {
    let mut out_idx = 0;
    for (sub_idx, stream) in media.subtitle_streams().enumerate() {
        if stream.is_text_subtitle() {
            push(
                args,
                [
                    "-map".to_string(),
                    format!("0:s:{}?", sub_idx),
                    format!("-c:s:{}", out_idx),
                    SUBTITLE_CODEC.to_string(),
                ],
            );
            out_idx += 1;
        }
    }
}

/// Build the ffmpeg invocation for one (source, target, mode).
pub fn build_encode_plan(req: &EncodeRequest) -> Result<EncodePlan, BuildError> {
    if req.target.max_width == 0 || req.target.max_height == 0 {
        return Err(BuildError::InvalidGeometry(req.target.label));
    }
    if !req.media.has_video() {
        return Err(BuildError::NoVideoStream(req.source.display().to_string()));
    }

    let gpu_pipeline = req.mode == AccelMode::Hardware && req.full_gpu_pipeline;
    let mut args = Vec::new();

    push(
        &mut args,
        ["-y", "-hide_banner", "-loglevel", "error", "-nostats"],
    );
    apply_threads(&mut args, req, gpu_pipeline);

    args.push("-i".into());
    args.push(req.source.as_os_str().to_os_string());

    push(
        &mut args,
        [
            "-map".to_string(),
            "0:v:0".to_string(),
            "-vf".to_string(),
            scale_filter(req.target, gpu_pipeline),
        ],
    );
    apply_video_codec(&mut args, req, gpu_pipeline);
    apply_audio(&mut args, req.media);
    apply_subtitles(&mut args, req.media);

    push(
        &mut args,
        ["-f", TARGET_CONTAINER, "-movflags", "+faststart"],
    );
    args.push(req.destination.as_os_str().to_os_string());
    push(&mut args, ["-progress", "pipe:1"]);

    Ok(EncodePlan {
        program: "ffmpeg".into(),
        args,
        mode: req.mode,
        source: req.source.to_path_buf(),
        destination: req.destination.to_path_buf(),
    })
}
