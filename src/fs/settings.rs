//! Settings persistence.
//!
//! Settings live as JSON in `.backlogsmith/settings.json`. Every field has a
//! default, so a partial file only overrides what it names and a missing file
//! means "all defaults".

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::Model;
use crate::core::generation::SectionPolicy;
use crate::core::job::{DEFAULT_ANALYSIS_TIMEOUT_SECS, DEFAULT_BACKLOG_TIMEOUT_SECS, JobKind};
use crate::core::retry::RetryConfig;
use crate::core::sections::{MIN_EPICS, Section, SectionValidator};

/// Directory for backlogsmith configuration files.
pub const CONFIG_DIR: &str = ".backlogsmith";

/// Settings file name inside [`CONFIG_DIR`].
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RETENTION_SECS: u64 = 3600;
pub const DEFAULT_ANALYSIS_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKLOG_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 0;

/// Output budget per section, in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgets {
    pub summary: u32,
    pub features: u32,
    pub roles: u32,
    pub timeline: u32,
    pub backlog: u32,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            summary: Section::Summary.default_max_new_tokens(),
            features: Section::Features.default_max_new_tokens(),
            roles: Section::Roles.default_max_new_tokens(),
            timeline: Section::Timeline.default_max_new_tokens(),
            backlog: Section::Backlog.default_max_new_tokens(),
        }
    }
}

impl TokenBudgets {
    #[must_use]
    pub const fn for_section(&self, section: Section) -> u32 {
        match section {
            Section::Summary => self.summary,
            Section::Features => self.features,
            Section::Roles => self.roles,
            Section::Timeline => self.timeline,
            Section::Backlog => self.backlog,
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Generator backend.
    pub model: Model,
    pub watchdog_interval_secs: u64,
    /// Age after which the watchdog forgets a job.
    pub retention_secs: u64,
    pub analysis_timeout_secs: u64,
    pub backlog_timeout_secs: u64,
    pub analysis_max_retries: u32,
    pub backlog_max_retries: u32,
    /// Base and increment of the linear backoff between attempts.
    pub retry_backoff_ms: u64,
    pub min_epics: usize,
    pub max_new_tokens: TokenBudgets,
    /// Directory with `<section>.txt` template overrides.
    pub prompts_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: Model::default(),
            watchdog_interval_secs: DEFAULT_WATCHDOG_INTERVAL_SECS,
            retention_secs: DEFAULT_RETENTION_SECS,
            analysis_timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
            backlog_timeout_secs: DEFAULT_BACKLOG_TIMEOUT_SECS,
            analysis_max_retries: DEFAULT_ANALYSIS_MAX_RETRIES,
            backlog_max_retries: DEFAULT_BACKLOG_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            min_epics: MIN_EPICS,
            max_new_tokens: TokenBudgets::default(),
            prompts_dir: None,
        }
    }
}

impl Settings {
    #[must_use]
    pub const fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Timeout for a job of `kind`.
    #[must_use]
    pub const fn timeout_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Analysis => Duration::from_secs(self.analysis_timeout_secs),
            JobKind::Backlog => Duration::from_secs(self.backlog_timeout_secs),
        }
    }

    /// Attempts per section for a job of `kind`.
    #[must_use]
    pub const fn max_retries_for(&self, kind: JobKind) -> u32 {
        match kind {
            JobKind::Analysis => self.analysis_max_retries,
            JobKind::Backlog => self.backlog_max_retries,
        }
    }

    /// Generation policy for `section` within a job of `kind`.
    #[must_use]
    pub const fn policy_for(&self, kind: JobKind, section: Section) -> SectionPolicy {
        SectionPolicy {
            retry: RetryConfig::new(
                self.max_retries_for(kind),
                self.retry_backoff_ms,
                self.retry_backoff_ms,
            ),
            max_new_tokens: Some(self.max_new_tokens.for_section(section)),
            validator: SectionValidator::new().with_min_epics(self.min_epics),
        }
    }
}

/// Ensures the directory holding `settings_file` exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_config_dir(settings_file: &Path) -> Result<()> {
    if let Some(dir) = settings_file.parent()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Loads settings from `path`.
///
/// If the file doesn't exist, returns default settings.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path).context("Failed to read settings file")?;

    serde_json::from_str(&content).context("Failed to parse settings file")
}

/// Saves settings to `path` as pretty-printed JSON, creating the parent
/// directory if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    ensure_config_dir(path)?;
    let json = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

    std::fs::write(path, json).context("Failed to write settings file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    // ==========================================================================
    // Defaults
    // ==========================================================================

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();

        assert_eq!(settings.watchdog_interval(), Duration::from_secs(10));
        assert_eq!(settings.retention(), Duration::from_secs(3600));
        assert_eq!(settings.timeout_for(JobKind::Analysis), Duration::from_secs(300));
        assert_eq!(settings.timeout_for(JobKind::Backlog), Duration::from_secs(600));
        assert_eq!(settings.max_retries_for(JobKind::Analysis), 3);
        assert_eq!(settings.max_retries_for(JobKind::Backlog), 5);
        assert_eq!(settings.min_epics, 4);
        assert_eq!(settings.max_new_tokens.for_section(Section::Backlog), 4096);
        assert!(settings.prompts_dir.is_none());
    }

    #[test]
    fn policy_follows_kind_and_section() {
        let settings = Settings {
            retry_backoff_ms: 50,
            min_epics: 2,
            ..Settings::default()
        };

        let policy = settings.policy_for(JobKind::Analysis, Section::Roles);

        assert_eq!(policy.retry.max_attempts, 3);
        assert_eq!(policy.retry.wait_duration(1), Duration::from_millis(100));
        assert_eq!(policy.max_new_tokens, Some(768));
        assert_eq!(policy.validator, SectionValidator::new().with_min_epics(2));
        assert_eq!(
            settings
                .policy_for(JobKind::Backlog, Section::Roles)
                .retry
                .max_attempts,
            5
        );
    }

    // ==========================================================================
    // Persistence
    // ==========================================================================

    #[test]
    fn load_nonexistent_file_returns_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let settings = load_settings(&temp_dir.path().join("missing.json"))?;
        assert_eq!(settings, Settings::default());
        Ok(())
    }

    #[test]
    fn partial_file_overrides_only_named_fields() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "model": "claude", "backlog_timeout_secs": 30, "max_new_tokens": { "backlog": 8000 } }"#,
        )?;

        let settings = load_settings(&path)?;

        assert_eq!(settings.model, Model::Claude);
        assert_eq!(settings.backlog_timeout_secs, 30);
        assert_eq!(settings.analysis_timeout_secs, 300);
        assert_eq!(settings.max_new_tokens.backlog, 8000);
        assert_eq!(settings.max_new_tokens.summary, 512);
        Ok(())
    }

    #[test]
    fn invalid_json_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json")?;

        let err = load_settings(&path).err();
        assert!(err.is_some_and(|e| e.to_string().contains("parse")));
        Ok(())
    }

    #[test]
    fn save_creates_directory_and_round_trips() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join(CONFIG_DIR).join(SETTINGS_FILE_NAME);
        let settings = Settings {
            model: Model::Gemini,
            prompts_dir: Some(PathBuf::from("prompts")),
            ..Settings::default()
        };

        save_settings(&path, &settings)?;

        assert!(path.exists());
        assert_eq!(load_settings(&path)?, settings);
        Ok(())
    }
}
