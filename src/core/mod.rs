//! Core business logic: jobs, cancellation, generation and parsing.

pub mod backlog;
pub mod cancel;
pub mod events;
pub mod executor;
pub mod extract;
pub mod generation;
pub mod job;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod retry;
pub mod sections;
pub mod watchdog;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use backlog::{Backlog, Epic, Origin, SubEpic, Task, UserStory};
pub use cancel::{CancellationToken, Cancelled};
pub use events::JobEvent;
pub use executor::{CliGenerator, GenerationOptions, Generator};
pub use extract::{Feature, Role, TimelineWeek};
pub use generation::{SectionPolicy, generate_section};
pub use job::{Job, JobId, JobKind, JobStatus};
pub use parser::{parse_and_repair, parse_backlog, repair};
pub use pipeline::{JobOutcome, Orchestrator, PipelineError, ProjectPlan};
pub use prompts::{FilePromptSource, PromptCache, PromptSource};
pub use registry::JobRegistry;
pub use retry::RetryConfig;
pub use sections::{Section, SectionValidator};
pub use watchdog::{TimeoutWatchdog, WatchdogHandle};

/// Available AI CLI backends for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// `OpenAI` Codex CLI.
    #[default]
    Codex,
    /// Anthropic Claude Code CLI.
    Claude,
    /// Google Gemini CLI.
    Gemini,
}

impl Model {
    /// Returns the display name for the model.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Codex => "Codex",
            Self::Claude => "Claude Code",
            Self::Gemini => "Gemini",
        }
    }

    /// Returns the CLI command name for this model.
    #[must_use]
    pub const fn command(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Creates a generator driving this model's CLI.
    #[must_use]
    pub fn generator(&self) -> Arc<dyn Generator> {
        match self {
            Self::Codex => Arc::new(CliGenerator::codex()),
            Self::Claude => Arc::new(CliGenerator::claude()),
            Self::Gemini => Arc::new(CliGenerator::gemini()),
        }
    }

    /// Returns all available models.
    #[must_use]
    pub const fn all() -> &'static [Model] {
        &[Model::Codex, Model::Claude, Model::Gemini]
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Model::all()
            .iter()
            .copied()
            .find(|model| {
                model.command().eq_ignore_ascii_case(s) || model.name().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| format!("unknown model: {s}"))
    }
}
