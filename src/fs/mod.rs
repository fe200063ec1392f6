//! On-disk configuration: settings and prompt template overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;

pub mod settings;

pub use settings::{
    CONFIG_DIR, SETTINGS_FILE_NAME, Settings, TokenBudgets, load_settings, save_settings,
};

/// Default directory name for prompt template overrides inside [`CONFIG_DIR`].
pub const PROMPTS_DIR_NAME: &str = "prompts";

/// Holds all backlogsmith paths derived from a base directory.
///
/// Tests root this at a temporary directory instead of the working
/// directory.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use backlogsmith::fs::WorkspacePaths;
///
/// let paths = WorkspacePaths::new(Path::new("/tmp/test"));
/// assert_eq!(
///     paths.settings_file(),
///     Path::new("/tmp/test/.backlogsmith/settings.json")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    base: PathBuf,
}

impl WorkspacePaths {
    #[must_use]
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
        }
    }

    /// Creates paths rooted at the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn from_cwd() -> anyhow::Result<Self> {
        let base = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self { base })
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the `.backlogsmith` directory path.
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.base.join(CONFIG_DIR)
    }

    /// Returns the settings file path (`.backlogsmith/settings.json`).
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Returns the prompt override directory.
    ///
    /// A configured `prompts_dir` is resolved against the base directory;
    /// otherwise `.backlogsmith/prompts` is used.
    #[must_use]
    pub fn prompts_dir(&self, settings: &Settings) -> PathBuf {
        settings.prompts_dir.as_ref().map_or_else(
            || self.config_dir().join(PROMPTS_DIR_NAME),
            |dir| self.base.join(dir),
        )
    }

    /// Loads settings from the settings file, or defaults if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        load_settings(&self.settings_file())
    }

    /// Saves settings, creating the `.backlogsmith` directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        save_settings(&self.settings_file(), settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_are_derived_from_base() {
        let paths = WorkspacePaths::new(Path::new("/test/base"));

        assert_eq!(paths.base(), Path::new("/test/base"));
        assert_eq!(paths.config_dir(), Path::new("/test/base/.backlogsmith"));
        assert_eq!(
            paths.settings_file(),
            Path::new("/test/base/.backlogsmith/settings.json")
        );
        assert_eq!(
            paths.prompts_dir(&Settings::default()),
            Path::new("/test/base/.backlogsmith/prompts")
        );
    }

    #[test]
    fn configured_prompts_dir_is_resolved_against_base() {
        let paths = WorkspacePaths::new(Path::new("/test/base"));
        let relative = Settings {
            prompts_dir: Some(PathBuf::from("templates")),
            ..Settings::default()
        };
        let absolute = Settings {
            prompts_dir: Some(PathBuf::from("/etc/prompts")),
            ..Settings::default()
        };

        assert_eq!(paths.prompts_dir(&relative), Path::new("/test/base/templates"));
        assert_eq!(paths.prompts_dir(&absolute), Path::new("/etc/prompts"));
    }

    #[test]
    fn settings_round_trip_through_paths() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = WorkspacePaths::new(temp_dir.path());

        assert_eq!(paths.load_settings()?, Settings::default());
        assert!(!paths.config_dir().exists());

        let settings = Settings {
            min_epics: 6,
            ..Settings::default()
        };
        paths.save_settings(&settings)?;

        assert!(paths.config_dir().exists());
        assert_eq!(paths.load_settings()?, settings);
        Ok(())
    }
}
