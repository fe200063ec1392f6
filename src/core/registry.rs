//! Thread-safe registry of in-flight generation jobs.
//!
//! Every operation takes the registry lock exactly once, so each one is
//! atomic with respect to the others. Status transitions are monotonic:
//! a job leaves `Running` at most once and late transition attempts are
//! ignored rather than reported as errors.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken as CancelSignal;
use tracing::{debug, info, warn};

use crate::core::cancel::CancellationToken;
use crate::core::events::JobEvent;
use crate::core::job::{Job, JobId, JobKind, JobStatus};

/// Capacity of the event fan-out channel. Slow subscribers lag, they never
/// block the registry.
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct JobEntry {
    job: Job,
    signal: CancelSignal,
    started: Instant,
    timeout: Duration,
}

impl JobEntry {
    fn snapshot(&self) -> Job {
        let mut job = self.job.clone();
        job.cancel_requested = self.signal.is_cancelled();
        job
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.job.status == JobStatus::Running && now.duration_since(self.started) > self.timeout
    }
}

/// Registry of tracked jobs.
///
/// Construct one per process and share it behind an `Arc`.
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    events: broadcast::Sender<JobEvent>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.len())
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        // The map only holds plain data, so a panic elsewhere cannot leave it
        // half-updated.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to status changes and pipeline progress.
    ///
    /// Status changes arrive in the order they were applied, across all jobs.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Sends an event. Never blocks; status changes call this while the map
    /// lock is held.
    pub(crate) fn publish(&self, event: JobEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Registers a new running job and returns its id and cancellation token.
    pub fn create(
        &self,
        subject_id: impl Into<String>,
        kind: JobKind,
        timeout: Duration,
    ) -> (JobId, CancellationToken) {
        let id = JobId::new();
        let signal = CancelSignal::new();
        let job = Job {
            id,
            subject_id: subject_id.into(),
            kind,
            status: JobStatus::Running,
            started_at: Utc::now(),
            timeout_seconds: timeout.as_secs(),
            cancel_requested: false,
        };
        info!(
            job_id = %id,
            subject_id = %job.subject_id,
            kind = kind.name(),
            timeout_secs = timeout.as_secs(),
            "job created"
        );

        let mut jobs = self.entries();
        jobs.insert(
            id,
            JobEntry {
                job,
                signal: signal.clone(),
                started: Instant::now(),
                timeout,
            },
        );
        self.publish(JobEvent::StatusChanged {
            job_id: id,
            status: JobStatus::Running,
        });
        drop(jobs);

        (id, CancellationToken::new(id, signal))
    }

    /// Returns a snapshot of the job, if it is still tracked.
    #[must_use]
    pub fn get(&self, job_id: JobId) -> Option<Job> {
        self.entries().get(&job_id).map(JobEntry::snapshot)
    }

    /// Returns a fresh token bound to a tracked job.
    #[must_use]
    pub fn token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.entries()
            .get(&job_id)
            .map(|entry| CancellationToken::new(job_id, entry.signal.clone()))
    }

    /// Requests cancellation of a running job.
    ///
    /// Returns whether the request took effect; false if the job is unknown
    /// or already terminal.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let changed = self.transition(job_id, JobStatus::Cancelled, true);
        if changed {
            info!(job_id = %job_id, "job cancelled");
        }
        changed
    }

    /// Marks a running job completed. No-op if it is already terminal.
    pub fn complete(&self, job_id: JobId) -> bool {
        let changed = self.transition(job_id, JobStatus::Completed, false);
        if changed {
            info!(job_id = %job_id, "job completed");
        }
        changed
    }

    /// Marks a running job failed. No-op if it is already terminal.
    pub fn fail(&self, job_id: JobId) -> bool {
        let changed = self.transition(job_id, JobStatus::Failed, false);
        if changed {
            warn!(job_id = %job_id, "job failed");
        }
        changed
    }

    /// Cancels and then fails a running job in a single step.
    ///
    /// The cancel signal is raised before the status becomes `Failed`, so a
    /// token check racing with the timeout always observes the cancellation.
    pub fn time_out(&self, job_id: JobId) -> bool {
        let changed = self.transition(job_id, JobStatus::Failed, true);
        if changed {
            warn!(job_id = %job_id, "job timed out");
        }
        changed
    }

    /// Applies a transition and publishes it under the same lock, so status
    /// events go out in the order transitions were applied, across jobs too.
    fn transition(&self, job_id: JobId, to: JobStatus, raise_signal: bool) -> bool {
        let mut jobs = self.entries();
        let Some(entry) = jobs.get_mut(&job_id) else {
            debug!(job_id = %job_id, to = %to, "transition on unknown job ignored");
            return false;
        };
        if entry.job.status.is_terminal() {
            debug!(
                job_id = %job_id,
                from = %entry.job.status,
                to = %to,
                "late transition ignored"
            );
            return false;
        }
        if raise_signal {
            entry.signal.cancel();
        }
        entry.job.status = to;
        self.publish(JobEvent::StatusChanged { job_id, status: to });
        drop(jobs);
        true
    }

    /// Returns whether the job's cancel signal is set. Unknown jobs read as
    /// not cancelled.
    #[must_use]
    pub fn is_cancelled(&self, job_id: JobId) -> bool {
        self.entries()
            .get(&job_id)
            .is_some_and(|entry| entry.signal.is_cancelled())
    }

    /// Snapshots every job that is still running.
    #[must_use]
    pub fn running(&self) -> Vec<Job> {
        self.entries()
            .values()
            .filter(|entry| entry.job.status == JobStatus::Running)
            .map(JobEntry::snapshot)
            .collect()
    }

    /// Returns the running jobs that have outlived their timeout.
    #[must_use]
    pub fn expired(&self) -> Vec<JobId> {
        let now = Instant::now();
        self.entries()
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.job.id)
            .collect()
    }

    /// Evicts every entry older than `max_age`, whatever its status.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut jobs = self.entries();
        let before = jobs.len();
        jobs.retain(|_, entry| now.duration_since(entry.started) <= max_age);
        let evicted = before - jobs.len();
        if evicted > 0 {
            info!(evicted, remaining = jobs.len(), "swept old jobs");
        }
        evicted
    }

    /// Number of tracked jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true if no jobs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
