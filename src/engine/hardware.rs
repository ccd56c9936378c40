//! NVIDIA capability detection.
//!
//! Probed once at startup; the engine treats the result as fixed input.

use std::process::Command;
use std::sync::OnceLock;

use crate::engine::core::VIDEO_CODEC_GPU;

/// GPU scaling filter used when decode also runs on the GPU
pub const GPU_SCALE_FILTER: &str = "scale_cuda";

/// Cache for the output of `ffmpeg -encoders`.
static FFMPEG_ENCODERS_OUTPUT_CACHE: OnceLock<String> = OnceLock::new();

/// Cache for the output of `ffmpeg -filters`.
static FFMPEG_FILTERS_OUTPUT_CACHE: OnceLock<String> = OnceLock::new();

fn ffmpeg_list_output(flag: &str) -> String {
    Command::new("ffmpeg")
        .args(["-hide_banner", flag])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
        .unwrap_or_default()
}

fn ffmpeg_encoders_output() -> &'static str {
    FFMPEG_ENCODERS_OUTPUT_CACHE.get_or_init(|| ffmpeg_list_output("-encoders"))
}

fn ffmpeg_filters_output() -> &'static str {
    FFMPEG_FILTERS_OUTPUT_CACHE.get_or_init(|| ffmpeg_list_output("-filters"))
}

/// True if `name` appears in the name column of `ffmpeg -encoders` / `-filters`.
/// Both listings put flags first and the name second.
pub fn listing_has(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

pub fn check_nvenc_available() -> bool {
    listing_has(ffmpeg_encoders_output(), VIDEO_CODEC_GPU)
}

pub fn check_scale_cuda_available() -> bool {
    listing_has(ffmpeg_filters_output(), GPU_SCALE_FILTER)
}

/// Startup acceleration decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// h264_nvenc is listed by ffmpeg
    pub nvenc: bool,
    /// scale_cuda is listed by ffmpeg
    pub scale_cuda: bool,
    /// User asked for NVDEC + GPU scaling
    pub gpu_decode_requested: bool,
}

impl Capabilities {
    pub fn detect(gpu_decode_requested: bool) -> Self {
        let nvenc = check_nvenc_available();
        // The filter list only matters when GPU decode is wanted
        let scale_cuda = gpu_decode_requested && nvenc && check_scale_cuda_available();
        Self {
            nvenc,
            scale_cuda,
            gpu_decode_requested,
        }
    }

    /// Decode and scale both stay on the GPU
    pub fn full_gpu_pipeline(&self) -> bool {
        self.nvenc && self.gpu_decode_requested && self.scale_cuda
    }
}
