//! Job identity, kind and lifecycle status.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default timeout for analysis jobs.
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 300;

/// Default timeout for backlog jobs.
pub const DEFAULT_BACKLOG_TIMEOUT_SECS: u64 = 600;

/// Opaque unique identifier of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What a job generates.
///
/// The kind only selects default timeout and retry budgets; every kind runs
/// the same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Proposal analysis (summary, features, roles, timeline).
    Analysis,
    /// Full backlog generation.
    #[default]
    Backlog,
}

impl JobKind {
    /// Returns the lowercase name used in settings and on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Backlog => "backlog",
        }
    }

    /// Returns the built-in timeout for this kind.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        match self {
            Self::Analysis => Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            Self::Backlog => Duration::from_secs(DEFAULT_BACKLOG_TIMEOUT_SECS),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" => Ok(Self::Analysis),
            "backlog" => Ok(Self::Backlog),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

/// Lifecycle status of a job.
///
/// `Running` is the only non-terminal status. Once a job leaves it, the
/// status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true if no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns the lowercase status name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time view of a tracked job.
///
/// Snapshots are detached copies; mutating a job is only possible through
/// [`JobRegistry`](crate::core::JobRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Identifier of the owning entity, opaque to this crate.
    pub subject_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub timeout_seconds: u64,
    /// Whether the job's cancel signal has been raised.
    pub cancel_requested: bool,
}
