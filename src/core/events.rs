//! Notifications handed to the broadcast layer.

use std::borrow::Cow;

use serde::Serialize;

use crate::core::job::{JobId, JobStatus};
use crate::core::sections::Section;

/// Something observable happened to a job.
///
/// Events are plain data; how they are delivered to clients is up to
/// whoever subscribes to [`JobRegistry::subscribe`](crate::core::JobRegistry::subscribe).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// The job entered a new lifecycle status.
    StatusChanged { job_id: JobId, status: JobStatus },
    /// A pipeline section is about to be generated.
    SectionStarted { job_id: JobId, section: Section },
    /// A pipeline section finished; `produced` is false when every attempt
    /// came back empty or malformed.
    SectionFinished {
        job_id: JobId,
        section: Section,
        produced: bool,
    },
}

impl JobEvent {
    /// Returns the job the event belongs to.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::StatusChanged { job_id, .. }
            | Self::SectionStarted { job_id, .. }
            | Self::SectionFinished { job_id, .. } => *job_id,
        }
    }

    /// Returns a human-readable description of the event.
    #[must_use]
    pub fn description(&self) -> Cow<'static, str> {
        match self {
            Self::StatusChanged { status, .. } => Cow::Owned(format!("Job {status}")),
            Self::SectionStarted { section, .. } => {
                Cow::Owned(format!("Generating {}", section.name()))
            }
            Self::SectionFinished {
                section,
                produced: true,
                ..
            } => Cow::Owned(format!("Generated {}", section.name())),
            Self::SectionFinished {
                section,
                produced: false,
                ..
            } => Cow::Owned(format!("No usable {} output", section.name())),
        }
    }
}
