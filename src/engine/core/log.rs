use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Longest log file name we produce
const MAX_LOG_NAME_LEN: usize = 180;

/// Replace every run of characters outside `[A-Za-z0-9_. -]` with one `_`
/// and cap the length.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_bad_run = false;
    for c in name.chars() {
        let ok = c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ' ' | '-');
        if ok {
            out.push(c);
            in_bad_run = false;
        } else if !in_bad_run {
            out.push('_');
            in_bad_run = true;
        }
    }
    out.chars().take(MAX_LOG_NAME_LEN).collect()
}

/// `<log_dir>/<stem>__<label>[-CPU].log`
pub fn attempt_log_path(log_dir: &Path, source: &Path, label: &str, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    log_dir.join(sanitize_filename(&format!("{}__{}{}.log", stem, label, suffix)))
}

/// Per-attempt artifact: the exact invocation, ffmpeg diagnostics and a
/// terminal status marker.
pub struct AttemptLog {
    path: PathBuf,
    out: BufWriter<File>,
}

impl AttemptLog {
    pub fn create(path: &Path, command_line: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create attempt log: {}", path.display()))?;
        let mut log = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        };
        writeln!(
            log.out,
            "# Started: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(log.out, "# FFmpeg command:\n{}\n", command_line)?;
        log.out.flush()?;
        Ok(log)
    }

    pub fn stderr_line(&mut self, line: &str) {
        // Write errors are ignored; the encode carries on
        let _ = writeln!(self.out, "[STDERR] {}", line);
        let _ = self.out.flush();
    }

    pub fn note(&mut self, line: &str) {
        let _ = writeln!(self.out, "# {}", line);
    }

    pub fn finish(&mut self, success: bool) -> Result<()> {
        let marker = if success { "SUCCESS" } else { "FAILED" };
        writeln!(self.out, "\n# STATUS: {}", marker)?;
        self.out.flush()?;
        tracing::debug!(path = %self.path.display(), success, "attempt log closed");
        Ok(())
    }
}

/// Route `tracing` output to `<log_dir>/plexopt.log`; the terminal belongs
/// to the status board while a run is active.
pub fn init_tracing(log_dir: &Path, verbose: bool) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let path = log_dir.join("plexopt.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(path)
}
