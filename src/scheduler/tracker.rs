#![forbid(unsafe_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{Command, CommandStatus};

/// A submitted job as seen by status queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedJob {
    pub job_id: String,
    #[serde(flatten)]
    pub command: Command,
}

impl TrackedJob {
    #[must_use]
    pub fn new_id() -> String {
        let id = Uuid::new_v4().simple().to_string();
        let short: String = id.chars().take(12).collect();
        format!("job-{short}")
    }
}

/// In-flight jobs in submission order. Every access goes through one lock.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<Mutex<Vec<TrackedJob>>>,
}

impl JobTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: TrackedJob) {
        self.jobs.lock().push(job);
    }

    pub fn set_status(&self, job_id: &str, status: CommandStatus) -> bool {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.iter_mut().find(|j| j.job_id == job_id) else {
            return false;
        };
        tracing::debug!(
            job_id,
            hash = %job.command.hash,
            from = job.command.status.as_str(),
            to = status.as_str(),
            "updating job status"
        );
        job.command.status = status;
        true
    }

    pub fn remove(&self, job_id: &str) -> Option<TrackedJob> {
        let mut jobs = self.jobs.lock();
        let index = jobs.iter().position(|j| j.job_id == job_id)?;
        Some(jobs.remove(index))
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<TrackedJob> {
        self.jobs.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
