//! Pipeline sections and the structural checks their output must pass.
//!
//! The literal prefixes and thresholds below are part of the output contract
//! with the prompts; a response that does not meet them is retried.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum number of `Epic ...:` lines a backlog must contain.
pub const MIN_EPICS: usize = 4;

/// Minimum number of task lines a backlog must contain.
pub const MIN_TASKS: usize = 1;

/// Prefix every summary response starts with.
pub const SUMMARY_PREFIX: &str = "summary:";
/// Prefix every features response starts with.
pub const FEATURES_PREFIX: &str = "features:";
/// Prefix every roles response starts with.
pub const ROLES_PREFIX: &str = "roles:";
/// Marker a timeline response must contain.
pub const TIMELINE_MARKER: &str = "timeline:";
/// Key every timeline week carries.
pub const WEEK_NUMBER_KEY: &str = "week_number:";
/// Bullet marker for list sections.
pub const BULLET: &str = "- ";

/// Matches template variables such as `{goals}` that the model echoed back
/// instead of filling in.
static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}").ok());

/// A named step of the generation pipeline.
///
/// Sections run in declaration order because later prompts embed the parsed
/// output of earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Summary,
    Features,
    Roles,
    Timeline,
    Backlog,
}

impl Section {
    /// Returns every section in pipeline order.
    #[must_use]
    pub const fn all() -> &'static [Section] {
        &[
            Section::Summary,
            Section::Features,
            Section::Roles,
            Section::Timeline,
            Section::Backlog,
        ]
    }

    /// Returns the section name used for templates and settings.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Features => "features",
            Self::Roles => "roles",
            Self::Timeline => "timeline",
            Self::Backlog => "backlog",
        }
    }

    /// Returns the built-in output budget in tokens.
    #[must_use]
    pub const fn default_max_new_tokens(&self) -> u32 {
        match self {
            Self::Summary => 512,
            Self::Features => 1024,
            Self::Roles => 768,
            Self::Timeline => 1536,
            Self::Backlog => 4096,
        }
    }

    /// Checks a raw response against this section's structural contract,
    /// using the default backlog thresholds.
    #[must_use]
    pub fn is_valid(&self, text: &str) -> bool {
        SectionValidator::new().is_valid(*self, text)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::all()
            .iter()
            .copied()
            .find(|section| section.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown section: {s}"))
    }
}

/// Structural checks for raw section output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionValidator {
    /// Minimum `Epic ...:` lines in a backlog.
    pub min_epics: usize,
    /// Minimum task lines in a backlog.
    pub min_tasks: usize,
}

impl Default for SectionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionValidator {
    /// Creates a validator with the default thresholds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_epics: MIN_EPICS,
            min_tasks: MIN_TASKS,
        }
    }

    /// Overrides the backlog epic threshold.
    #[must_use]
    pub const fn with_min_epics(mut self, min_epics: usize) -> Self {
        self.min_epics = min_epics;
        self
    }

    /// Returns true if `text` satisfies the contract for `section`.
    #[must_use]
    pub fn is_valid(&self, section: Section, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        match section {
            Section::Summary => text.starts_with(SUMMARY_PREFIX),
            Section::Features => text.starts_with(FEATURES_PREFIX) && has_bullet(text),
            Section::Roles => text.starts_with(ROLES_PREFIX) && has_bullet(text),
            Section::Timeline => {
                text.contains(TIMELINE_MARKER)
                    && text.contains(WEEK_NUMBER_KEY)
                    && !has_placeholder(text)
            }
            Section::Backlog => {
                let (epics, tasks) = count_backlog_lines(text);
                epics >= self.min_epics && tasks >= self.min_tasks
            }
        }
    }
}

fn has_bullet(text: &str) -> bool {
    text.lines().any(|line| line.trim_start().starts_with(BULLET))
}

fn has_placeholder(text: &str) -> bool {
    PLACEHOLDER
        .as_ref()
        .is_some_and(|placeholder| placeholder.is_match(text))
}

/// Counts epic heading lines and task lines in raw backlog text.
#[must_use]
pub fn count_backlog_lines(text: &str) -> (usize, usize) {
    text.lines()
        .map(str::trim)
        .fold((0, 0), |(epics, tasks), line| {
            if line.starts_with("Epic") && line.contains(':') {
                (epics + 1, tasks)
            } else if line.starts_with("-Task") || line.starts_with("Task") {
                (epics, tasks + 1)
            } else {
                (epics, tasks)
            }
        })
}
