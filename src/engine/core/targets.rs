//! Output target catalog.
//!
//! Order matters: a target may only cascade from a target defined before it.

/// One output rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub label: &'static str,
    pub max_width: u32,
    pub max_height: u32,
    /// ffmpeg rate string, e.g. "8M"
    pub max_bitrate: &'static str,
    pub buffer_size: &'static str,
    /// NVENC `-cq` value; clamped into the CRF window for libx264
    pub quality: u32,
    /// Earlier target whose finished output may replace the original source
    pub depends_on: Option<&'static str>,
}

pub const OPTIMIZED_1080P: Target = Target {
    label: "Optimized-1080p",
    max_width: 1920,
    max_height: 1080,
    max_bitrate: "8M",
    buffer_size: "16M",
    quality: 19,
    depends_on: None,
};

pub const OPTIMIZED_720P: Target = Target {
    label: "Optimized-720p",
    max_width: 1280,
    max_height: 720,
    max_bitrate: "4M",
    buffer_size: "8M",
    quality: 21,
    depends_on: Some(OPTIMIZED_1080P.label),
};

/// Catalog order, highest resolution first.
pub const TARGETS: &[Target] = &[OPTIMIZED_1080P, OPTIMIZED_720P];

/// Baseline resolution a source must exceed to get optimized versions.
pub const BASELINE_WIDTH: u32 = 1920;
pub const BASELINE_HEIGHT: u32 = 1080;

impl Target {
    /// Look up a catalog entry by label
    pub fn by_label(label: &str) -> Option<&'static Target> {
        TARGETS.iter().find(|t| t.label == label)
    }

    /// Short form of the label used in pane headers ("1080p")
    pub fn short_label(&self) -> &'static str {
        self.label.rsplit('-').next().unwrap_or(self.label)
    }
}

/// Resolution-eligibility filter applied before a job is created.
pub fn is_eligible(width: u32, height: u32) -> bool {
    width > BASELINE_WIDTH || height > BASELINE_HEIGHT
}
