// Execution adapter: runs one encode attempt and reports its outcome

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::core::{
    AttemptLog, AttemptResult, CancelToken, EncodePlan, ProgressSnapshot, format_ffmpeg_cmd,
};
use crate::ui::render::clamp_interval;
use crate::ui::status::PaneHandle;

/// Stderr lines kept for the pane
const ERROR_TAIL_LINES: usize = 3;

/// How often the read loop wakes to check for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One execution request handed to a [`Transcoder`].
#[derive(Debug, Clone)]
pub struct Attempt<'a> {
    pub plan: &'a EncodePlan,
    /// First pane line, e.g. `[GPU#1] Optimized-720p [src=1080p]`
    pub header: String,
    pub log_path: PathBuf,
}

/// Transcoding collaborator.
///
/// Spawn and IO failures come back as `Err`; everything the process itself
/// did (including being killed) is an `AttemptResult`.
pub trait Transcoder: Send + Sync {
    fn transcode(
        &self,
        attempt: &Attempt<'_>,
        pane: &PaneHandle,
        cancel: &CancelToken,
    ) -> Result<AttemptResult>;
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait for `child` to exit; `None` once `cancel` fires first.
fn wait_unless_cancelled(child: &mut Child, cancel: &CancelToken) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait().context("Failed to wait for ffmpeg")? {
            return Ok(Some(status));
        }
        if cancel.sleep(POLL_INTERVAL) {
            return Ok(None);
        }
    }
}

/// Runs ffmpeg (or whatever program the plan names) as a subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    /// Minimum gap between pane refreshes from the progress stream
    refresh: Duration,
}

impl FfmpegTranscoder {
    /// `refresh` is clamped to the status board's refresh window.
    pub fn new(refresh: Duration) -> Self {
        Self {
            refresh: clamp_interval(refresh.as_secs_f64()),
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(
        &self,
        attempt: &Attempt<'_>,
        pane: &PaneHandle,
        cancel: &CancelToken,
    ) -> Result<AttemptResult> {
        let plan = attempt.plan;
        if let Some(parent) = plan.destination.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }

        let log = Arc::new(Mutex::new(AttemptLog::create(
            &attempt.log_path,
            &format_ffmpeg_cmd(plan),
        )?));

        let header = attempt.header.clone();
        let src_line = format!("File: {}", file_name(&plan.source));
        let out_line = format!("Output: {}", file_name(&plan.destination));
        pane.set([
            header.clone(),
            src_line.clone(),
            out_line.clone(),
            "Status: starting...".to_string(),
        ]);

        tracing::info!(
            mode = plan.mode.tag(),
            source = %plan.source.display(),
            destination = %plan.destination.display(),
            "starting attempt"
        );

        let mut cmd = plan.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let mut log = lock(&log);
                log.note(&format!("spawn failed: {}", e));
                log.finish(false)?;
                return Err(e).with_context(|| {
                    format!("Failed to spawn {}", plan.program.to_string_lossy())
                });
            }
        };

        let tail: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));

        let stderr = child.stderr.take().context("Failed to capture stderr")?;
        let stderr_log = Arc::clone(&log);
        let stderr_tail = Arc::clone(&tail);
        let stderr_thread = thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                lock(&stderr_log).stderr_line(&line);
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    let mut tail = lock(&stderr_tail);
                    if tail.len() == ERROR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(trimmed.to_string());
                }
            }
        });

        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let (tx, rx) = mpsc::channel::<String>();
        let stdout_thread = thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let last_error = |fallback: &str| -> String {
            lock(&tail)
                .back()
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };

        let mut progress = ProgressSnapshot::new();
        let mut last_draw: Option<Instant> = None;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    progress.apply_line(&line);
                    // The closing block is always drawn
                    let due = last_draw.is_none_or(|t| t.elapsed() >= self.refresh);
                    if due || progress.is_complete() {
                        pane.set([
                            header.clone(),
                            src_line.clone(),
                            progress.display_line(),
                            out_line.clone(),
                            format!("Last error: {}", last_error("(none)")),
                        ]);
                        last_draw = Some(Instant::now());
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // The progress stream can close well before ffmpeg exits
        let exit = if cancelled {
            None
        } else {
            wait_unless_cancelled(&mut child, cancel)?
        };

        let Some(status) = exit else {
            // Readers may still hold pipes shared with grandchildren; leave them detached
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "kill after cancel");
            }
            let status = child.wait().context("Failed to wait for ffmpeg")?;
            let mut log = lock(&log);
            log.note("cancelled");
            log.finish(false)?;
            drop(log);

            pane.set([
                header,
                src_line,
                "Status: cancelled.".to_string(),
                out_line,
            ]);
            tracing::info!(destination = %plan.destination.display(), "attempt cancelled");
            return Ok(AttemptResult::from_exit(
                plan.mode,
                status.code(),
                &plan.destination,
                true,
            ));
        };

        let _ = stdout_thread.join();
        let _ = stderr_thread.join();

        let result = AttemptResult::from_exit(plan.mode, status.code(), &plan.destination, false);
        lock(&log).finish(result.succeeded())?;

        if result.succeeded() {
            pane.set([
                header,
                src_line,
                "Status: done.".to_string(),
                out_line,
                format!("Log: {}", attempt.log_path.display()),
            ]);
            tracing::info!(destination = %plan.destination.display(), "attempt succeeded");
        } else {
            let error = last_error("unknown error");
            pane.set([
                header,
                src_line,
                "Status: FAILED.".to_string(),
                out_line,
                format!("Error: {}", error),
            ]);
            tracing::warn!(
                exit_code = ?status.code(),
                destination = %plan.destination.display(),
                error = %error,
                "attempt failed"
            );
        }

        Ok(result)
    }
}
