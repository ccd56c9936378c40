// Stream metadata via ffprobe

use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Subtitle codecs that can be carried into mp4 as mov_text
pub const TEXT_SUBTITLE_CODECS: &[&str] =
    &["subrip", "srt", "ass", "ssa", "webvtt", "mov_text", "text"];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffprobe failed for {path}: {stderr}")]
    Failed { path: String, stderr: String },

    #[error("failed to parse ffprobe JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl StreamInfo {
    fn is_type(&self, kind: &str) -> bool {
        self.codec_type.as_deref() == Some(kind)
    }

    pub fn is_text_subtitle(&self) -> bool {
        let name = self
            .codec_name
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        TEXT_SUBTITLE_CODECS.contains(&name.as_str())
    }
}

/// Parsed `ffprobe -show_streams` output. An empty stream list is a valid
/// result, distinct from a probe failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn video_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.is_type("video"))
    }

    pub fn has_video(&self) -> bool {
        self.video_streams().next().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.streams.iter().any(|s| s.is_type("audio"))
    }

    /// Subtitle streams in subtitle-relative order (the `0:s:N` numbering)
    pub fn subtitle_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.is_type("subtitle"))
    }

    /// Dimensions of the first video stream
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.video_streams()
            .next()
            .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
    }
}

/// Parse ffprobe JSON
pub fn parse_ffprobe_json(json: &str) -> Result<MediaInfo, ProbeError> {
    Ok(serde_json::from_str(json)?)
}

/// Metadata collaborator. Trait so the engine can run against scripted probes.
pub trait Prober: Send + Sync {
    /// Full stream listing
    fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;

    /// Fast path: first video stream's width/height only
    fn dimensions(&self, path: &Path) -> Option<(u32, u32)>;
}

/// `ffprobe` on PATH
#[derive(Debug, Clone, Default)]
pub struct FfprobeProber;

impl FfprobeProber {
    fn run(&self, path: &Path, args: &[&str]) -> Result<MediaInfo, ProbeError> {
        let output = Command::new("ffprobe").args(args).arg(path).output()?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                path: path.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Prober for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        self.run(
            path,
            &[
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ],
        )
    }

    fn dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        let info = self
            .run(
                path,
                &[
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=width,height",
                    "-of",
                    "json",
                ],
            )
            .ok()?;
        // The fast query drops codec_type, so read the first entry directly
        info.streams
            .first()
            .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
    }
}
