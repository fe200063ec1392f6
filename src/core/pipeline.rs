//! Orchestrates a job: one prompt per section, retried until valid, then
//! extracted into a [`ProjectPlan`].
//!
//! Sections run in a fixed order because later prompts embed earlier
//! results: the timeline is planned against the feature titles and the
//! backlog sees the timeline tasks it may annotate as covered.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::backlog::Backlog;
use crate::core::cancel::{Cancelled, CancellationToken};
use crate::core::events::JobEvent;
use crate::core::executor::Generator;
use crate::core::extract::{
    Feature, Role, TimelineWeek, extract_features, extract_roles, extract_summary,
    extract_timeline,
};
use crate::core::generation::generate_section;
use crate::core::job::{JobId, JobKind, JobStatus};
use crate::core::parser::parse_and_repair;
use crate::core::prompts::{
    PromptCache, format_features, format_goals, format_timeline_tasks, render,
};
use crate::core::registry::JobRegistry;
use crate::core::sections::Section;
use crate::fs::Settings;

/// Reason reported for jobs the watchdog failed.
pub const TIMED_OUT_REASON: &str = "timed out";

/// Everything a finished pipeline produced.
///
/// Sections whose generation never passed validation are left empty; the
/// backlog is always padded to the configured minimum number of epics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPlan {
    pub summary: String,
    pub features: Vec<Feature>,
    pub roles: Vec<Role>,
    pub timeline: Vec<TimelineWeek>,
    pub backlog: Backlog,
}

/// Errors that abort a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("unknown job {0}")]
    UnknownJob(JobId),
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed(ProjectPlan),
    Cancelled,
    Failed { reason: String },
}

impl JobOutcome {
    /// Terminal job status matching this outcome.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        match self {
            Self::Completed(_) => JobStatus::Completed,
            Self::Cancelled => JobStatus::Cancelled,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Values substituted into section templates.
#[derive(Debug, Default)]
struct PromptContext {
    proposal: String,
    summary: String,
    features: String,
    goals: String,
    timeline_tasks: String,
    min_epics: String,
}

impl PromptContext {
    fn render(&self, template: &str) -> String {
        render(
            template,
            &[
                ("proposal", self.proposal.as_str()),
                ("summary", self.summary.as_str()),
                ("features", self.features.as_str()),
                ("goals", self.goals.as_str()),
                ("timeline_tasks", self.timeline_tasks.as_str()),
                ("min_epics", self.min_epics.as_str()),
            ],
        )
    }
}

/// Entry points for creating, cancelling and running jobs.
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    prompts: Arc<PromptCache>,
    generator: Arc<dyn Generator>,
    settings: Settings,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("generator", &self.generator.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<JobRegistry>,
        prompts: Arc<PromptCache>,
        generator: Arc<dyn Generator>,
        settings: Settings,
    ) -> Self {
        Self {
            registry,
            prompts,
            generator,
            settings,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Registers a running job. `timeout` defaults to the configured timeout
    /// for `kind`.
    pub fn create_job(
        &self,
        subject_id: impl Into<String>,
        kind: JobKind,
        timeout: Option<Duration>,
    ) -> (JobId, CancellationToken) {
        let timeout = timeout.unwrap_or_else(|| self.settings.timeout_for(kind));
        self.registry.create(subject_id, kind, timeout)
    }

    /// Requests cancellation. Returns false for unknown or finished jobs.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        self.registry.cancel(job_id)
    }

    /// Generates every section for `proposal`.
    ///
    /// The token is checked before each section and before each attempt;
    /// no generator call is made once the job is cancelled. Sections that
    /// never produce valid output are left empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] if the job was cancelled (by a
    /// caller or by the watchdog) and [`PipelineError::UnknownJob`] if the
    /// registry does not know `job_id`.
    pub async fn run_pipeline(
        &self,
        job_id: JobId,
        token: &CancellationToken,
        proposal: &str,
    ) -> Result<ProjectPlan, PipelineError> {
        let kind = self
            .registry
            .get(job_id)
            .map(|job| job.kind)
            .ok_or(PipelineError::UnknownJob(job_id))?;

        let mut context = PromptContext {
            proposal: proposal.to_string(),
            min_epics: self.settings.min_epics.to_string(),
            ..PromptContext::default()
        };
        let mut plan = ProjectPlan::default();

        let summary = self
            .section(job_id, kind, Section::Summary, &context, token)
            .await?;
        plan.summary = extract_summary(&summary);
        context.summary.clone_from(&plan.summary);

        let features = self
            .section(job_id, kind, Section::Features, &context, token)
            .await?;
        plan.features = extract_features(&features);
        context.features = format_features(&plan.features);
        context.goals = format_goals(&plan.features);

        let roles = self
            .section(job_id, kind, Section::Roles, &context, token)
            .await?;
        plan.roles = extract_roles(&roles);

        let timeline = self
            .section(job_id, kind, Section::Timeline, &context, token)
            .await?;
        plan.timeline = extract_timeline(&timeline);
        context.timeline_tasks = format_timeline_tasks(&plan.timeline);

        let backlog = self
            .section(job_id, kind, Section::Backlog, &context, token)
            .await?;
        plan.backlog = parse_and_repair(&backlog, self.settings.min_epics);

        info!(
            job_id = %job_id,
            features = plan.features.len(),
            roles = plan.roles.len(),
            weeks = plan.timeline.len(),
            epics = plan.backlog.epics.len(),
            tasks = plan.backlog.task_count(),
            "pipeline finished"
        );
        Ok(plan)
    }

    async fn section(
        &self,
        job_id: JobId,
        kind: JobKind,
        section: Section,
        context: &PromptContext,
        token: &CancellationToken,
    ) -> Result<String, Cancelled> {
        token.check()?;
        self.registry
            .publish(JobEvent::SectionStarted { job_id, section });

        let prompt = context.render(&self.prompts.template(section));
        let policy = self.settings.policy_for(kind, section);
        let text = generate_section(
            self.generator.as_ref(),
            section,
            &prompt,
            &policy,
            Some(token),
        )
        .await?;

        self.registry.publish(JobEvent::SectionFinished {
            job_id,
            section,
            produced: !text.is_empty(),
        });
        Ok(text)
    }

    /// Runs the pipeline for a registered job and records how it ended.
    ///
    /// A job the watchdog timed out reports [`JobOutcome::Failed`] with
    /// [`TIMED_OUT_REASON`]; a job cancelled by a caller reports
    /// [`JobOutcome::Cancelled`].
    pub async fn run_job(&self, job_id: JobId, proposal: &str) -> JobOutcome {
        let Some(token) = self.registry.token(job_id) else {
            return JobOutcome::Failed {
                reason: PipelineError::UnknownJob(job_id).to_string(),
            };
        };

        match self.run_pipeline(job_id, &token, proposal).await {
            Ok(plan) => {
                if self.registry.complete(job_id) {
                    JobOutcome::Completed(plan)
                } else {
                    // Cancelled or timed out after the last checkpoint.
                    self.settled_outcome(job_id)
                }
            }
            Err(PipelineError::Cancelled(_)) => self.settled_outcome(job_id),
            Err(e @ PipelineError::UnknownJob(_)) => {
                warn!(job_id = %job_id, "pipeline aborted: {e}");
                JobOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn settled_outcome(&self, job_id: JobId) -> JobOutcome {
        match self.registry.get(job_id).map(|job| job.status) {
            Some(JobStatus::Failed) => JobOutcome::Failed {
                reason: TIMED_OUT_REASON.to_string(),
            },
            Some(_) => JobOutcome::Cancelled,
            None => JobOutcome::Failed {
                reason: PipelineError::UnknownJob(job_id).to_string(),
            },
        }
    }
}
