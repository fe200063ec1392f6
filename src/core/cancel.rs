//! Cooperative cancellation handles for running jobs.
//!
//! A [`CancellationToken`] is bound to exactly one job and shares that job's
//! cancel signal. Work only stops where the token is checked; nothing is
//! interrupted preemptively.

use tokio_util::sync::CancellationToken as CancelSignal;

use crate::core::job::JobId;

/// Returned by [`CancellationToken::check`] once the bound job is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job {job_id} was cancelled")]
pub struct Cancelled {
    pub job_id: JobId,
}

/// Caller-held handle used to poll a job's cancel signal.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    job_id: JobId,
    signal: CancelSignal,
}

impl CancellationToken {
    pub(crate) fn new(job_id: JobId, signal: CancelSignal) -> Self {
        Self { job_id, signal }
    }

    /// Returns the job this token is bound to.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Fails with [`Cancelled`] if the bound job's cancel signal is set.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when cancellation has been requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.signal.is_cancelled() {
            Err(Cancelled {
                job_id: self.job_id,
            })
        } else {
            Ok(())
        }
    }

    /// Non-failing variant of [`check`](Self::check).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }
}
