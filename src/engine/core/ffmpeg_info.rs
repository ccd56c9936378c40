use anyhow::{Context, Result};
use std::process::Command;

fn first_version_line(binary: &str) -> Result<String> {
    let output = Command::new(binary)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {}. Is it installed and in PATH?", binary))?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", binary, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version() -> Result<String> {
    first_version_line("ffmpeg")
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version() -> Result<String> {
    first_version_line("ffprobe")
}

/// Both collaborators must be present before anything is queued.
pub fn check_tools() -> Result<(String, String)> {
    let ffmpeg = ffmpeg_version()?;
    let ffprobe = ffprobe_version()?;
    Ok((ffmpeg, ffprobe))
}
