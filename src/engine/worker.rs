// Shared job queue and the per-worker processing loop

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

use super::cascade::{CascadeResolver, EngineContext, WorkerIdentity};
use super::core::{CancelToken, Job, JobReport};
use crate::ui::status::PaneHandle;

/// How long `join` waits between cancellation checks
const JOIN_POLL: Duration = Duration::from_millis(100);

/// Message from worker to the dispatcher
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Worker dequeued a job
    JobStarted {
        worker: String,
        job_id: Uuid,
        source: PathBuf,
    },

    /// Every target of the job reached a final state (or the job was abandoned)
    JobFinished { report: JobReport },

    /// Worker found the queue empty (or saw cancellation) and exited
    WorkerIdle { worker: String },
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    /// Jobs pushed but not yet marked done
    unfinished: usize,
}

/// FIFO shared by all workers: non-blocking pop plus a blocking
/// "wait until every job is done" join.
#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    all_done: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, job: Job) {
        let mut state = self.state();
        state.jobs.push_back(job);
        state.unfinished += 1;
    }

    /// Next job, or `None` when the queue is empty
    pub fn try_pop(&self) -> Option<Job> {
        self.state().jobs.pop_front()
    }

    /// Mark one popped job as finished
    pub fn task_done(&self) {
        let mut state = self.state();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
    }

    /// Jobs still waiting to be popped
    pub fn len(&self) -> usize {
        self.state().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unfinished(&self) -> usize {
        self.state().unfinished
    }

    /// Block until every pushed job is done. Returns false if `cancel`
    /// fired first.
    pub fn join(&self, cancel: &CancelToken) -> bool {
        let mut state = self.state();
        while state.unfinished > 0 {
            if cancel.is_cancelled() {
                return false;
            }
            state = self
                .all_done
                .wait_timeout(state, JOIN_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl FromIterator<Job> for JobQueue {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        let queue = Self::new();
        for job in iter {
            queue.push(job);
        }
        queue
    }
}

/// Marks the current job done even if processing unwinds
struct TaskDone<'q>(&'q JobQueue);

impl Drop for TaskDone<'_> {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

/// One named worker bound to an acceleration mode.
pub struct Worker {
    identity: WorkerIdentity,
    ctx: Arc<EngineContext>,
    queue: Arc<JobQueue>,
    pane: PaneHandle,
    tx: Sender<WorkerMessage>,
    cancel: CancelToken,
}

impl Worker {
    pub fn new(
        identity: WorkerIdentity,
        ctx: Arc<EngineContext>,
        queue: Arc<JobQueue>,
        pane: PaneHandle,
        tx: Sender<WorkerMessage>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            identity,
            ctx,
            queue,
            pane,
            tx,
            cancel,
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Pop and process jobs until the queue is empty or the run is cancelled.
    pub fn run(self) {
        let name = self.identity.name.clone();
        tracing::debug!(worker = %name, mode = self.identity.mode.tag(), "worker started");

        while !self.cancel.is_cancelled() {
            let Some(job) = self.queue.try_pop() else {
                self.pane.set([format!("[{}] idle.", name)]);
                break;
            };
            let _done = TaskDone(&self.queue);

            let _ = self.tx.send(WorkerMessage::JobStarted {
                worker: name.clone(),
                job_id: job.id,
                source: job.source_path.clone(),
            });
            let file = job
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.pane
                .set([format!("[{}] preparing...", name), format!("File: {}", file)]);

            let resolver =
                CascadeResolver::new(&self.ctx, &self.identity, &self.pane, &self.cancel);
            let report = resolver.run_job(&job);
            let _ = self.tx.send(WorkerMessage::JobFinished { report });
        }

        tracing::debug!(worker = %name, "worker exiting");
        let _ = self.tx.send(WorkerMessage::WorkerIdle { worker: name });
    }

    /// Run on a dedicated thread named after the worker
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(self.identity.name.clone())
            .spawn(move || self.run())
    }
}
