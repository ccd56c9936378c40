use super::targets::{TARGETS, is_eligible};
use super::types::Job;
use crate::engine::probe::Prober;
use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Video file extensions to scan for
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "mov", "avi", "m4v", "ts", "m2ts", "wmv", "webm",
];

/// Directory (next to each source) that holds optimized versions
pub const VERSIONS_DIRNAME: &str = "Plex Versions";

/// Output container for every target
pub const TARGET_CONTAINER: &str = "mp4";

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return VIDEO_EXTENSIONS.contains(&ext_str.to_lowercase().as_str());
        }
    }
    false
}

/// True for files this tool produced itself (inside a versions dir or
/// already carrying a target label suffix).
pub fn is_generated_output(path: &Path) -> bool {
    let in_versions_dir = path
        .parent()
        .and_then(|p| p.file_name())
        .is_some_and(|name| name == VERSIONS_DIRNAME);
    if in_versions_dir {
        return true;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    TARGETS
        .iter()
        .any(|t| stem.ends_with(&format!("({})", t.label)))
}

/// Scan a directory recursively for source videos and invoke a callback for each one
pub fn scan_streaming<F>(root: &Path, mut on_file: F) -> Result<()>
where
    F: FnMut(PathBuf),
{
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_video_file(path) && !is_generated_output(path) {
            on_file(path.to_path_buf());
        }
    }

    Ok(())
}

/// Scan a directory recursively for source videos
pub fn scan(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    scan_streaming(root, |path| files.push(path))?;
    files.sort();
    Ok(files)
}

/// Where a target's output for `source` lives:
/// `<dir>/Plex Versions/<stem> (<label>).mp4`
pub fn output_path(source: &Path, label: &str) -> PathBuf {
    let dir = source
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(VERSIONS_DIRNAME);
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{} ({}).{}", stem, label, TARGET_CONTAINER))
}

/// Result of filtering scanned files by resolution
#[derive(Debug, Default)]
pub struct CandidateScan {
    pub jobs: Vec<Job>,
    /// Sources at or below the baseline resolution (or unprobeable)
    pub skipped: Vec<(PathBuf, u32, u32)>,
}

/// Turn scanned files into jobs, keeping only sources above the baseline resolution.
pub fn build_job_queue(files: Vec<PathBuf>, prober: &dyn Prober) -> CandidateScan {
    let mut scan = CandidateScan::default();
    for path in files {
        let (width, height) = prober.dimensions(&path).unwrap_or((0, 0));
        if is_eligible(width, height) {
            scan.jobs.push(Job::new(path, width, height));
        } else {
            tracing::debug!(path = %path.display(), width, height, "below baseline resolution");
            scan.skipped.push((path, width, height));
        }
    }
    scan
}
