//! Cascade resolver and hardware-to-software fallback.
//!
//! Runs every catalog target for one job, in catalog order, on the calling
//! worker's thread. A target whose `depends_on` entry finished (or already
//! existed) reads that output instead of the original source.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::core::{
    AccelMode, AttemptResult, BudgetPlan, BuildError, CancelToken, EncodePlan, EncodeRequest,
    EncodedWith, Job, JobReport, TARGETS, Target, TargetOutcome, TargetState,
    attempt_log_path, build_encode_plan, output_path,
};
use super::hardware::Capabilities;
use super::probe::{MediaInfo, Prober};
use super::runner::{Attempt, Transcoder};
use crate::ui::status::PaneHandle;

/// Log-name suffix for software attempts
const SOFTWARE_LOG_SUFFIX: &str = "-CPU";

/// Per-run switches that affect every job.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Re-encode even when the destination already exists
    pub force: bool,
    /// Let dependent targets read their dependency's output
    pub cascade: bool,
    pub log_dir: PathBuf,
}

/// Everything a worker needs to process jobs; shared by all workers.
pub struct EngineContext {
    pub prober: Arc<dyn Prober>,
    pub transcoder: Arc<dyn Transcoder>,
    pub capabilities: Capabilities,
    pub budget: BudgetPlan,
    pub options: RunOptions,
}

/// Name and acceleration mode a worker runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub name: String,
    pub mode: AccelMode,
}

impl WorkerIdentity {
    pub fn new(name: impl Into<String>, mode: AccelMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }
}

fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Per-job record of finished outputs, keyed by target label.
#[derive(Debug, Default)]
pub struct CascadeState {
    sources: HashMap<&'static str, PathBuf>,
}

impl CascadeState {
    /// Remember `output` as available input for later targets. Empty or
    /// missing files are never recorded.
    pub fn record(&mut self, label: &'static str, output: &Path) {
        if is_nonempty_file(output) {
            self.sources.insert(label, output.to_path_buf());
        }
    }

    /// Input for `target`: its dependency's output when cascading and that
    /// output is still a non-empty file, else the original source. The
    /// second value names the input for pane headers.
    pub fn resolve_input(
        &self,
        target: &Target,
        original: &Path,
        cascade: bool,
    ) -> (PathBuf, &'static str) {
        if cascade {
            if let Some(dep) = target.depends_on {
                if let Some(path) = self.sources.get(dep).filter(|p| is_nonempty_file(p)) {
                    let tag = Target::by_label(dep)
                        .map(Target::short_label)
                        .unwrap_or(dep);
                    return (path.clone(), tag);
                }
            }
        }
        (original.to_path_buf(), "orig")
    }
}

/// Drives one job through the catalog for one worker.
pub struct CascadeResolver<'a> {
    ctx: &'a EngineContext,
    worker: &'a WorkerIdentity,
    pane: &'a PaneHandle,
    cancel: &'a CancelToken,
}

/// Where one target stands while its attempts run
struct TargetRun<'r> {
    target: &'static Target,
    input: PathBuf,
    destination: PathBuf,
    header: String,
    media: &'r MediaInfo,
}

impl<'a> CascadeResolver<'a> {
    pub fn new(
        ctx: &'a EngineContext,
        worker: &'a WorkerIdentity,
        pane: &'a PaneHandle,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            ctx,
            worker,
            pane,
            cancel,
        }
    }

    fn uses_hardware(&self) -> bool {
        self.worker.mode == AccelMode::Hardware && self.ctx.capabilities.nvenc
    }

    fn plan(&self, run: &TargetRun<'_>, mode: AccelMode) -> Result<EncodePlan, BuildError> {
        let (threads, full_gpu_pipeline) = match mode {
            AccelMode::Hardware => (
                self.ctx.budget.gpu_allotment(),
                self.ctx.capabilities.full_gpu_pipeline(),
            ),
            AccelMode::Software => (self.ctx.budget.cpu_allotment(), false),
        };
        build_encode_plan(&EncodeRequest {
            source: &run.input,
            destination: &run.destination,
            target: run.target,
            mode,
            threads,
            full_gpu_pipeline,
            media: run.media,
        })
    }

    fn execute(&self, run: &TargetRun<'_>, plan: &EncodePlan, header: String) -> AttemptResult {
        let suffix = match plan.mode {
            AccelMode::Hardware => "",
            AccelMode::Software => SOFTWARE_LOG_SUFFIX,
        };
        let attempt = Attempt {
            plan,
            header,
            log_path: attempt_log_path(
                &self.ctx.options.log_dir,
                &run.input,
                run.target.label,
                suffix,
            ),
        };
        match self
            .ctx
            .transcoder
            .transcode(&attempt, self.pane, self.cancel)
        {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    worker = %self.worker.name,
                    target = run.target.label,
                    error = %format!("{:#}", e),
                    "attempt could not run"
                );
                AttemptResult::from_exit(
                    plan.mode,
                    None,
                    &run.destination,
                    self.cancel.is_cancelled(),
                )
            }
        }
    }

    /// Pane shown until the transcoder reports progress
    fn announce(&self, run: &TargetRun<'_>, status: &str) {
        self.pane.set([
            run.header.clone(),
            format!("File: {}", file_name(&run.input)),
            format!("Status: {}", status),
            format!("Output: {}", file_name(&run.destination)),
        ]);
    }

    /// Hardware attempt (when available) then software; returns the final
    /// state and the modes actually executed.
    fn encode(&self, run: &TargetRun<'_>) -> (TargetState, Vec<AccelMode>) {
        let mut attempts = Vec::new();
        let mut fell_back = false;

        if self.uses_hardware() {
            match self.plan(run, AccelMode::Hardware) {
                Ok(plan) => {
                    attempts.push(AccelMode::Hardware);
                    self.announce(run, &TargetState::AttemptingHardware.to_string());
                    let result = self.execute(run, &plan, run.header.clone());
                    if result.cancelled {
                        return (TargetState::Cancelled, attempts);
                    }
                    if result.succeeded() {
                        return (TargetState::Succeeded(EncodedWith::Gpu), attempts);
                    }
                    tracing::info!(
                        worker = %self.worker.name,
                        target = run.target.label,
                        exit_code = ?result.exit_code,
                        "hardware attempt failed, falling back to software"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        worker = %self.worker.name,
                        target = run.target.label,
                        error = %e,
                        "hardware command could not be built"
                    );
                }
            }
            fell_back = true;
            if self.cancel.is_cancelled() {
                return (TargetState::Cancelled, attempts);
            }
        }

        let plan = match self.plan(run, AccelMode::Software) {
            Ok(plan) => plan,
            Err(e) => {
                self.pane.set([
                    run.header.clone(),
                    format!("File: {}", file_name(&run.input)),
                    format!("Build error: {}", e),
                    "Status: failed(build)".to_string(),
                ]);
                tracing::warn!(
                    worker = %self.worker.name,
                    target = run.target.label,
                    error = %e,
                    "software command could not be built"
                );
                return (TargetState::FailedBuild, attempts);
            }
        };

        if fell_back {
            self.announce(run, "fallback-to-CPU");
        } else {
            self.announce(run, &TargetState::AttemptingSoftware.to_string());
        }

        attempts.push(AccelMode::Software);
        let header = format!("{} (CPU)", run.header);
        let result = self.execute(run, &plan, header);
        let state = if result.cancelled {
            TargetState::Cancelled
        } else if result.succeeded() {
            TargetState::Succeeded(if fell_back {
                EncodedWith::CpuFallback
            } else {
                EncodedWith::Cpu
            })
        } else {
            TargetState::Failed {
                exit_code: result.failure_code(),
            }
        };
        (state, attempts)
    }

    /// Process every catalog target for `job`.
    pub fn run_job(&self, job: &Job) -> JobReport {
        let mut report = JobReport {
            job_id: job.id,
            source: job.source_path.clone(),
            worker: self.worker.name.clone(),
            outcomes: Vec::with_capacity(TARGETS.len()),
            cancelled: false,
        };
        let mut cascade = CascadeState::default();
        let options = &self.ctx.options;

        for target in TARGETS {
            let destination = output_path(&job.source_path, target.label);

            if self.cancel.is_cancelled() {
                report.cancelled = true;
                report.outcomes.push(TargetOutcome {
                    label: target.label,
                    input: job.source_path.clone(),
                    output: destination,
                    state: TargetState::Pending,
                    attempts: Vec::new(),
                });
                continue;
            }

            let (input, src_tag) =
                cascade.resolve_input(target, &job.source_path, options.cascade);
            let header = format!("[{}] {} [src={}]", self.worker.name, target.label, src_tag);
            let input_name = format!("File: {}", file_name(&input));

            // An empty leftover is not a finished output
            if !options.force && is_nonempty_file(&destination) {
                self.pane.set([
                    header,
                    input_name,
                    "Status: skipped(exists)".to_string(),
                    format!("Output: {}", file_name(&destination)),
                ]);
                cascade.record(target.label, &destination);
                tracing::debug!(destination = %destination.display(), "output exists, skipping");
                report.outcomes.push(TargetOutcome {
                    label: target.label,
                    input,
                    output: destination,
                    state: TargetState::SkippedExisting,
                    attempts: Vec::new(),
                });
                continue;
            }

            let media = match self.ctx.prober.probe(&input) {
                Ok(media) => media,
                Err(e) => {
                    self.pane.set([
                        header,
                        input_name,
                        format!("ffprobe: {}", e),
                        "Status: failed(ffprobe)".to_string(),
                    ]);
                    tracing::warn!(input = %input.display(), error = %e, "probe failed");
                    report.outcomes.push(TargetOutcome {
                        label: target.label,
                        input,
                        output: destination,
                        state: TargetState::SkippedProbeFailed,
                        attempts: Vec::new(),
                    });
                    continue;
                }
            };

            let run = TargetRun {
                target,
                input,
                destination,
                header,
                media: &media,
            };
            let (state, attempts) = self.encode(&run);
            debug_assert!(state.is_terminal());

            if state.is_cascade_source() {
                cascade.record(target.label, &run.destination);
            }
            if state == TargetState::Cancelled {
                report.cancelled = true;
            }

            report.outcomes.push(TargetOutcome {
                label: target.label,
                input: run.input,
                output: run.destination,
                state,
                attempts,
            });
        }

        tracing::info!(
            worker = %self.worker.name,
            source = %job.source_path.display(),
            code = report.code(),
            summary = %report.summary(),
            "job finished"
        );
        report
    }
}
