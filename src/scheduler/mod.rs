#![forbid(unsafe_code)]

//! Sequential command execution.
//!
//! One worker task consumes submissions in FIFO order and runs them one at a
//! time. Each submission carries its own completion slot, so a caller always
//! receives the result of the job it submitted. Once a job is finished the
//! worker runs the completion hook and schedules its vacuum, whether or not
//! the submitter is still waiting. Finished jobs stay visible in
//! [`Scheduler::status`] for the configured grace delay.

pub mod execution;
pub mod tracker;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::catalog::{Command, CommandStatus, ScheduledCommand};
use crate::error::SchedulerError;

pub use tracker::{JobTracker, TrackedJob};

/// Called on the blocking pool with every finished job, before its submitter
/// is answered.
pub type CompletionHook = Arc<dyn Fn(&ScheduledCommand) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub shell: String,
    pub vacuum_delay: Duration,
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_owned(),
            vacuum_delay: Duration::from_secs(3),
            queue_capacity: 1,
        }
    }
}

struct Submission {
    job_id: String,
    command: Command,
    reply: oneshot::Sender<ScheduledCommand>,
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    rx: oneshot::Receiver<ScheduledCommand>,
}

impl JobHandle {
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Waits for this job's own completion.
    pub async fn wait(self) -> Result<ScheduledCommand, SchedulerError> {
        self.rx.await.map_err(|_| SchedulerError::WorkerGone)
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: mpsc::Sender<Submission>,
    vacuum: mpsc::UnboundedSender<String>,
    tracker: JobTracker,
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("job_id", &self.job_id)
            .field("hash", &self.command.hash)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Spawns the worker and vacuum tasks. Must be called inside a tokio
    /// runtime. Both tasks exit once every clone of the scheduler is dropped.
    #[must_use]
    pub fn start(cfg: SchedulerConfig) -> Self {
        Self::spawn(cfg, None)
    }

    /// Like [`Scheduler::start`], with `hook` run for every finished job.
    #[must_use]
    pub fn start_with_hook(cfg: SchedulerConfig, hook: CompletionHook) -> Self {
        Self::spawn(cfg, Some(hook))
    }

    fn spawn(cfg: SchedulerConfig, hook: Option<CompletionHook>) -> Self {
        let (queue, queue_rx) = mpsc::channel(cfg.queue_capacity.max(1));
        let (vacuum, vacuum_rx) = mpsc::unbounded_channel();
        let tracker = JobTracker::new();

        let worker = Worker {
            shell: cfg.shell.clone(),
            tracker: tracker.clone(),
            vacuum: vacuum.clone(),
            hook,
        };
        tokio::spawn(worker.run(queue_rx));
        tokio::spawn(run_vacuum(cfg.vacuum_delay, tracker.clone(), vacuum_rx));

        tracing::info!(shell = %cfg.shell, vacuum_delay = ?cfg.vacuum_delay, "scheduler started");
        Self {
            queue,
            vacuum,
            tracker,
        }
    }

    /// Tracks `cmd` as `Scheduled` and hands it to the worker. Waits for queue
    /// capacity when the worker is busy.
    pub async fn submit(&self, mut cmd: Command) -> Result<JobHandle, SchedulerError> {
        if !cmd.working_directory.is_empty() && !Path::new(&cmd.working_directory).is_dir() {
            tracing::warn!(
                hash = %cmd.hash,
                working_directory = %cmd.working_directory,
                "refusing to schedule command"
            );
            return Err(SchedulerError::InvalidWorkingDirectory(
                cmd.working_directory,
            ));
        }

        let job_id = TrackedJob::new_id();
        cmd.status = CommandStatus::Scheduled;
        self.tracker.push(TrackedJob {
            job_id: job_id.clone(),
            command: cmd.clone(),
        });
        tracing::info!(job_id = %job_id, hash = %cmd.hash, "scheduling command");

        // Untracks the job unless the hand-off completes, including when this
        // future is dropped while waiting for queue capacity.
        let mut pending = PendingJob {
            tracker: &self.tracker,
            job_id: &job_id,
            queued: false,
        };

        let (reply, rx) = oneshot::channel();
        let submission = Submission {
            job_id: job_id.clone(),
            command: cmd,
            reply,
        };
        if self.queue.send(submission).await.is_err() {
            return Err(SchedulerError::WorkerGone);
        }
        pending.queued = true;
        drop(pending);

        Ok(JobHandle { job_id, rx })
    }

    /// Submits `cmd` and waits for its result.
    pub async fn run(&self, cmd: Command) -> Result<(String, ScheduledCommand), SchedulerError> {
        let handle = self.submit(cmd).await?;
        let job_id = handle.job_id().to_owned();
        let finished = handle.wait().await?;
        Ok((job_id, finished))
    }

    /// Forgets `job_id` after the vacuum delay. The worker does this for every
    /// finished job; calling it again is harmless.
    pub fn cleanup(&self, job_id: &str) {
        if self.vacuum.send(job_id.to_owned()).is_err() {
            tracing::warn!(job_id, "vacuum task is gone; removing job now");
            self.tracker.remove(job_id);
        }
    }

    /// Jobs submitted and not yet vacuumed, in submission order.
    #[must_use]
    pub fn status(&self) -> Vec<TrackedJob> {
        let jobs = self.tracker.snapshot();
        tracing::debug!(total = jobs.len(), "status requested");
        jobs
    }
}

struct PendingJob<'a> {
    tracker: &'a JobTracker,
    job_id: &'a str,
    queued: bool,
}

impl Drop for PendingJob<'_> {
    fn drop(&mut self) {
        if !self.queued && self.tracker.remove(self.job_id).is_some() {
            tracing::warn!(job_id = %self.job_id, "submission abandoned before it was queued");
        }
    }
}

struct Worker {
    shell: String,
    tracker: JobTracker,
    vacuum: mpsc::UnboundedSender<String>,
    hook: Option<CompletionHook>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Submission>) {
        while let Some(sub) = rx.recv().await {
            self.tracker.set_status(&sub.job_id, CommandStatus::Running);

            let finished = execution::execute(&self.shell, sub.command).await;
            self.tracker.set_status(&sub.job_id, finished.command.status);
            log_finished(&sub.job_id, &finished);

            if let Some(hook) = &self.hook {
                let hook = Arc::clone(hook);
                let record = finished.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || hook(&record)).await {
                    tracing::error!(job_id = %sub.job_id, error = %e, "completion hook failed");
                }
            }

            if self.vacuum.send(sub.job_id.clone()).is_err() {
                self.tracker.remove(&sub.job_id);
            }

            if sub.reply.send(finished).is_err() {
                tracing::warn!(job_id = %sub.job_id, "submitter went away before completion");
            }
        }
        tracing::debug!("scheduler worker stopped");
    }
}

fn log_finished(job_id: &str, finished: &ScheduledCommand) {
    if finished.command.status == CommandStatus::Failed {
        tracing::error!(
            job_id,
            hash = %finished.command.hash,
            exit_status = finished.exit_status,
            output = %finished.coutput,
            "command failed"
        );
    } else {
        tracing::info!(
            job_id,
            hash = %finished.command.hash,
            duration_ms = finished.command.duration,
            "command completed"
        );
    }
}

async fn run_vacuum(
    delay: Duration,
    tracker: JobTracker,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(job_id) = rx.recv().await {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tracker.remove(&job_id).is_some() {
                tracing::debug!(job_id = %job_id, remaining = tracker.len(), "vacuumed job");
            }
        });
    }
}
