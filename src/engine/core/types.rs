use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One source file waiting for its optimized versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: Uuid,
    pub source_path: PathBuf,
    pub probed_width: u32,
    pub probed_height: u32,
}

impl Job {
    pub fn new(source_path: PathBuf, probed_width: u32, probed_height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path,
            probed_width,
            probed_height,
        }
    }
}

/// Execution path for one encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelMode {
    /// NVENC (optionally NVDEC + scale_cuda)
    Hardware,
    /// libx264
    Software,
}

impl AccelMode {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Hardware => "GPU",
            Self::Software => "CPU",
        }
    }
}

/// Outcome of one (job, target) execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub mode: AccelMode,
    /// `None` when the process was killed by a signal or never started
    pub exit_code: Option<i32>,
    pub output_exists: bool,
    pub output_nonempty: bool,
    pub cancelled: bool,
}

impl AttemptResult {
    /// Inspect the destination after a finished process.
    ///
    /// Any non-successful attempt leaves no zero-byte file behind, so later
    /// existence checks never mistake it for a finished output.
    pub fn from_exit(
        mode: AccelMode,
        exit_code: Option<i32>,
        destination: &Path,
        cancelled: bool,
    ) -> Self {
        let size = fs::metadata(destination).ok().map(|m| m.len());
        let mut result = Self {
            mode,
            exit_code,
            output_exists: size.is_some(),
            output_nonempty: size.is_some_and(|s| s > 0),
            cancelled,
        };

        if !result.succeeded() && size == Some(0) {
            match fs::remove_file(destination) {
                Ok(()) => {
                    tracing::debug!(path = %destination.display(), "removed zero-byte output");
                    result.output_exists = false;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %destination.display(),
                        error = %e,
                        "could not remove zero-byte output"
                    );
                }
            }
        }

        result
    }

    /// Exit code zero and a non-empty destination; nothing else is trusted.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.output_exists && self.output_nonempty
    }

    /// Code reported for a failed attempt: the exit code, or 1 when it is
    /// missing or misleadingly zero.
    pub fn failure_code(&self) -> i32 {
        match self.exit_code {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }
}

/// How a target ended up encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedWith {
    Gpu,
    CpuFallback,
    Cpu,
}

/// Per-target state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetState {
    Pending,
    SkippedExisting,
    SkippedProbeFailed,
    AttemptingHardware,
    AttemptingSoftware,
    Succeeded(EncodedWith),
    FailedBuild,
    Failed { exit_code: i32 },
    /// Interrupted mid-attempt; not counted in the job result
    Cancelled,
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Pending | Self::AttemptingHardware | Self::AttemptingSoftware
        )
    }

    /// Only a finished or pre-existing output may feed later targets
    pub fn is_cascade_source(&self) -> bool {
        matches!(self, Self::SkippedExisting | Self::Succeeded(_))
    }

    /// Code folded into the job result; `None` for states that do not count.
    pub fn result_code(&self) -> Option<i32> {
        match self {
            Self::SkippedExisting | Self::Succeeded(_) => Some(0),
            Self::SkippedProbeFailed | Self::FailedBuild => Some(1),
            Self::Failed { exit_code } => Some(*exit_code),
            Self::Pending
            | Self::AttemptingHardware
            | Self::AttemptingSoftware
            | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::SkippedExisting => write!(f, "skipped(exists)"),
            Self::SkippedProbeFailed => write!(f, "failed(ffprobe)"),
            Self::AttemptingHardware => write!(f, "encoding(GPU)"),
            Self::AttemptingSoftware => write!(f, "encoding(CPU)"),
            Self::Succeeded(EncodedWith::Gpu) => write!(f, "encoded(GPU)"),
            Self::Succeeded(EncodedWith::CpuFallback) => write!(f, "encoded(CPU-fallback)"),
            Self::Succeeded(EncodedWith::Cpu) => write!(f, "encoded(CPU)"),
            Self::FailedBuild => write!(f, "failed(build)"),
            Self::Failed { exit_code } => write!(f, "failed(ffmpeg rc={})", exit_code),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final record for one target of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub label: &'static str,
    /// Input actually fed to ffmpeg (original source or a cascade source)
    pub input: PathBuf,
    pub output: PathBuf,
    pub state: TargetState,
    /// Modes that were actually executed, in order
    pub attempts: Vec<AccelMode>,
}

impl TargetOutcome {
    pub fn status_line(&self) -> String {
        format!("{}: {}", self.label, self.state)
    }
}

/// Aggregate result of one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    pub source: PathBuf,
    pub worker: String,
    pub outcomes: Vec<TargetOutcome>,
    pub cancelled: bool,
}

impl JobReport {
    fn counted(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state.result_code().is_some())
    }

    /// "Optimized-1080p: encoded(GPU) | Optimized-720p: encoded(GPU)"
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self.counted().map(|o| o.status_line()).collect();
        if parts.is_empty() {
            if self.cancelled {
                "cancelled".to_string()
            } else {
                "no-op".to_string()
            }
        } else {
            parts.join(" | ")
        }
    }

    /// Worst per-target code; 0 when nothing counted.
    pub fn code(&self) -> i32 {
        self.counted()
            .filter_map(|o| o.state.result_code())
            .max()
            .unwrap_or(0)
    }

    pub fn outcome(&self, label: &str) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.label == label)
    }
}

/// Key/value fields from ffmpeg's `-progress` stream.
///
/// Best effort: unknown keys are kept but ignored, missing keys read as unknown.
#[derive(Debug, Default, Clone)]
pub struct ProgressSnapshot {
    fields: BTreeMap<String, String>,
}

impl ProgressSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one `key=value` line; anything else is ignored.
    pub fn apply_line(&mut self, line: &str) {
        if let Some((key, value)) = line.trim().split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                self.fields.insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Encoded position as HH:MM:SS
    pub fn out_time(&self) -> Option<String> {
        if let Some(t) = self.get("out_time").filter(|t| !t.is_empty() && *t != "N/A") {
            let whole = t.split('.').next().unwrap_or(t);
            return Some(whole.to_string());
        }

        // Both keys carry microseconds in ffmpeg's progress output
        let us = self
            .get("out_time_us")
            .or_else(|| self.get("out_time_ms"))
            .and_then(|v| v.parse::<u64>().ok())?;
        let mut secs = us / 1_000_000;
        let hours = secs / 3600;
        secs -= hours * 3600;
        let minutes = secs / 60;
        secs -= minutes * 60;
        Some(format!("{:02}:{:02}:{:02}", hours, minutes, secs))
    }

    pub fn fps(&self) -> Option<&str> {
        self.get("fps")
    }

    pub fn speed(&self) -> Option<&str> {
        self.get("speed")
    }

    /// Output size so far in MiB
    pub fn size_mb(&self) -> Option<f64> {
        self.get("total_size")
            .and_then(|v| v.parse::<u64>().ok())
            .map(|b| b as f64 / 1_048_576.0)
    }

    pub fn is_complete(&self) -> bool {
        self.get("progress") == Some("end")
    }

    /// One-line display form used by worker panes
    pub fn display_line(&self) -> String {
        let size = self
            .size_mb()
            .map(|mb| format!("{:.1}MB", mb))
            .unwrap_or_default();
        format!(
            "t={}  fps={}  speed={}  size={}",
            self.out_time().unwrap_or_else(|| "--:--:--".to_string()),
            self.fps().unwrap_or("?"),
            self.speed().unwrap_or("?"),
            size
        )
    }
}
