//! Scheduler: names workers, starts them and the renderer once, waits for
//! the queue to drain (or for cancellation) and collects job reports.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use super::cascade::{EngineContext, WorkerIdentity};
use super::core::{AccelMode, CancelToken, Job, JobReport};
use super::worker::{JobQueue, Worker, WorkerMessage};
use crate::ui::render::{RenderMode, Renderer};
use crate::ui::status::{MAX_PANES, StatusBoard};

/// Accelerated workers a run may start
pub const MAX_GPU_WORKERS: u32 = 2;

/// Software workers a run may start
pub const MAX_CPU_WORKERS: u32 = 1;

/// `GPU#1..GPU#n` followed by `CPU#1..CPU#m`
pub fn worker_identities(gpu_workers: u32, cpu_workers: u32) -> Vec<WorkerIdentity> {
    let gpu = (1..=gpu_workers)
        .map(|i| WorkerIdentity::new(format!("GPU#{}", i), AccelMode::Hardware));
    let cpu = (1..=cpu_workers)
        .map(|i| WorkerIdentity::new(format!("CPU#{}", i), AccelMode::Software));
    gpu.chain(cpu).collect()
}

/// Pane names: the workers' names, padded with `IDLE#n` up to three panes.
pub fn pane_names(workers: &[WorkerIdentity]) -> Vec<String> {
    let mut names: Vec<String> = workers.iter().map(|w| w.name.clone()).collect();
    while names.len() < MAX_PANES {
        names.push(format!("IDLE#{}", names.len() + 1));
    }
    names
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub gpu_workers: u32,
    pub cpu_workers: u32,
    /// Renderer interval, already clamped
    pub refresh: Duration,
    /// `None` runs without a display
    pub render_mode: Option<RenderMode>,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
    pub cancelled: bool,
    /// Jobs that never left the queue
    pub not_started: usize,
}

impl RunSummary {
    /// Jobs whose worst code is 0 and that were not abandoned
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.code() == 0 && !r.cancelled)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.code() != 0).count()
    }

    pub fn interrupted(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.cancelled && r.code() == 0)
            .count()
    }
}

pub struct Dispatcher {
    ctx: Arc<EngineContext>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(ctx: Arc<EngineContext>, config: DispatchConfig) -> Self {
        Self { ctx, config }
    }

    /// Queue `jobs`, run every worker to completion and return their reports.
    pub fn run(&self, jobs: Vec<Job>, cancel: &CancelToken) -> Result<RunSummary> {
        let (gpu_workers, cpu_workers) = (self.config.gpu_workers, self.config.cpu_workers);
        anyhow::ensure!(
            gpu_workers.saturating_add(cpu_workers) > 0,
            "at least one worker is required"
        );
        // Every worker owns a pane
        anyhow::ensure!(
            gpu_workers <= MAX_GPU_WORKERS && cpu_workers <= MAX_CPU_WORKERS,
            "at most {} GPU and {} CPU workers are supported, got {} and {}",
            MAX_GPU_WORKERS,
            MAX_CPU_WORKERS,
            gpu_workers,
            cpu_workers
        );
        let identities = worker_identities(gpu_workers, cpu_workers);

        let queue: Arc<JobQueue> = Arc::new(jobs.into_iter().collect());
        let board = StatusBoard::new(pane_names(&identities));

        tracing::info!(
            jobs = queue.len(),
            gpu_workers = self.config.gpu_workers,
            cpu_workers = self.config.cpu_workers,
            "dispatch starting"
        );

        let renderer = match self.config.render_mode {
            Some(mode) => Some(
                Renderer::spawn(Arc::clone(&board), self.config.refresh, mode, cancel.clone())
                    .context("Failed to start status renderer")?,
            ),
            None => None,
        };

        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(identities.len());
        for identity in identities {
            let pane = board.pane(identity.name.clone());
            let worker = Worker::new(
                identity,
                Arc::clone(&self.ctx),
                Arc::clone(&queue),
                pane,
                tx.clone(),
                cancel.clone(),
            );
            let name = worker.identity().name.clone();
            let handle = worker
                .spawn()
                .with_context(|| format!("Failed to spawn worker {}", name))?;
            handles.push(handle);
        }
        drop(tx);

        let drained = queue.join(cancel);
        if !drained {
            tracing::warn!(remaining = queue.unfinished(), "cancelled before the queue drained");
        }

        // Workers stop at their next safe point; subprocesses are killed on cancel
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        if let Some(renderer) = renderer {
            renderer.stop();
        }

        let mut summary = RunSummary {
            cancelled: cancel.is_cancelled(),
            not_started: queue.len(),
            ..Default::default()
        };
        for message in rx.try_iter() {
            match message {
                WorkerMessage::JobFinished { report } => summary.reports.push(report),
                WorkerMessage::JobStarted { worker, source, .. } => {
                    tracing::debug!(worker = %worker, source = %source.display(), "job started");
                }
                WorkerMessage::WorkerIdle { worker } => {
                    tracing::debug!(worker = %worker, "worker idle");
                }
            }
        }

        tracing::info!(
            reports = summary.reports.len(),
            cancelled = summary.cancelled,
            not_started = summary.not_started,
            "dispatch finished"
        );
        Ok(summary)
    }
}
