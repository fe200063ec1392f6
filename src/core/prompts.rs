//! Prompt templates for each pipeline section.
//!
//! Templates are plain text with `{name}` placeholders. Each section has a
//! built-in template; a [`PromptSource`] can override it, and
//! [`PromptCache`] makes sure the source is asked at most once per section.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::core::extract::{Feature, TimelineWeek};
use crate::core::sections::Section;

/// File extension of template files in a prompts directory.
pub const TEMPLATE_EXTENSION: &str = "txt";

/// A `{name}` template variable.
static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Built-in summary template.
pub const SUMMARY_TEMPLATE: &str = r"You are a senior business analyst.

Read the project proposal below and write a concise summary (3-5 sentences) of what the project delivers and for whom.

Respond with a single block that starts with the literal prefix `summary:`.

<PROPOSAL>
{proposal}
</PROPOSAL>";

/// Built-in features template.
pub const FEATURES_TEMPLATE: &str = r"You are a senior product manager.

List the main features the project in the proposal below must deliver.

Respond in exactly this format:
features:
- Feature title: one sentence description

<SUMMARY>
{summary}
</SUMMARY>

<PROPOSAL>
{proposal}
</PROPOSAL>";

/// Built-in roles template.
pub const ROLES_TEMPLATE: &str = r"You are a delivery lead staffing a software project.

List the team roles needed to deliver the project below.

Respond in exactly this format:
roles:
- Role name: main responsibilities

<SUMMARY>
{summary}
</SUMMARY>

<FEATURES>
{features}
</FEATURES>";

/// Built-in timeline template.
pub const TIMELINE_TEMPLATE: &str = r"You are a project planner.

Plan the delivery week by week. Each week targets one of the goals below.

Respond in exactly this format, repeating the block for every week:
timeline:
- week_number: 1
  goal: Goal title
  tasks:
  - Task description

<GOALS>
{goals}
</GOALS>

<SUMMARY>
{summary}
</SUMMARY>";

/// Built-in backlog template.
pub const BACKLOG_TEMPLATE: &str = r"You are an agile coach breaking a project into a backlog.

Produce at least {min_epics} epics. Every epic has sub-epics, every sub-epic has user stories and every user story has tasks. When an epic covers one of the timeline tasks below, append `*(covers: <task>)*` to its title.

Respond using exactly these line prefixes and nothing else:
Epic 1: Epic title
-Sub-Epic 1.1: Sub-epic title
-User Story 1.1.1: As a <role>, I want <goal> so that <benefit>
-Task 1.1.1.1: Task title

<FEATURES>
{features}
</FEATURES>

<TIMELINE_TASKS>
{timeline_tasks}
</TIMELINE_TASKS>

<PROPOSAL>
{proposal}
</PROPOSAL>";

/// Returns the built-in template for `section`.
#[must_use]
pub const fn default_template(section: Section) -> &'static str {
    match section {
        Section::Summary => SUMMARY_TEMPLATE,
        Section::Features => FEATURES_TEMPLATE,
        Section::Roles => ROLES_TEMPLATE,
        Section::Timeline => TIMELINE_TEMPLATE,
        Section::Backlog => BACKLOG_TEMPLATE,
    }
}

/// Where section templates come from.
pub trait PromptSource: Send + Sync {
    /// Loads the template for `section`, or `None` if there is no override.
    fn load_template(&self, section: Section) -> Option<String>;
}

/// Uses only the built-in templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPrompts;

impl PromptSource for BuiltinPrompts {
    fn load_template(&self, _section: Section) -> Option<String> {
        None
    }
}

/// Reads `<dir>/<section>.txt`.
#[derive(Debug, Clone)]
pub struct FilePromptSource {
    dir: PathBuf,
}

impl FilePromptSource {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Returns the template path for `section`.
    #[must_use]
    pub fn template_path(&self, section: Section) -> PathBuf {
        self.dir
            .join(section.name())
            .with_extension(TEMPLATE_EXTENSION)
    }
}

impl PromptSource for FilePromptSource {
    fn load_template(&self, section: Section) -> Option<String> {
        let path = self.template_path(section);
        match std::fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => {
                debug!(%section, path = %path.display(), "loaded prompt template");
                Some(text)
            }
            Ok(_) => {
                warn!(%section, path = %path.display(), "prompt template is empty, using built-in");
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(%section, path = %path.display(), "failed to read prompt template: {e}");
                None
            }
        }
    }
}

/// Memoizes templates per section.
///
/// The source is consulted at most once per section, including when it has
/// no override.
pub struct PromptCache {
    source: Box<dyn PromptSource>,
    templates: Mutex<HashMap<Section, Arc<str>>>,
}

impl std::fmt::Debug for PromptCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptCache").finish_non_exhaustive()
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        Self::new(BuiltinPrompts)
    }
}

impl PromptCache {
    #[must_use]
    pub fn new(source: impl PromptSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            templates: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the template for `section`, loading it on first use.
    #[must_use]
    pub fn template(&self, section: Section) -> Arc<str> {
        let mut templates = self
            .templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(templates.entry(section).or_insert_with(|| {
            self.source
                .load_template(section)
                .map_or_else(|| Arc::from(default_template(section)), Arc::from)
        }))
    }

    /// Number of sections loaded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Substitutes `{key}` placeholders in one pass over the template.
///
/// Only the template's own placeholders are replaced; placeholder-like text
/// inside a substituted value is kept verbatim. Unknown placeholders are
/// left as they are.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let Some(placeholder) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    placeholder
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
        })
        .into_owned()
}

/// Renders features as `- Title: description` lines.
#[must_use]
pub fn format_features(features: &[Feature]) -> String {
    let mut s = String::new();
    for feature in features {
        if feature.description.is_empty() {
            let _ = writeln!(s, "- {}", feature.title);
        } else {
            let _ = writeln!(s, "- {}: {}", feature.title, feature.description);
        }
    }
    s.trim_end().to_string()
}

/// Renders feature titles as the goal list for the timeline.
#[must_use]
pub fn format_goals(features: &[Feature]) -> String {
    let mut s = String::new();
    for (index, feature) in features.iter().enumerate() {
        let _ = writeln!(s, "{}. {}", index + 1, feature.title);
    }
    s.trim_end().to_string()
}

/// Renders every timeline task as one bullet.
#[must_use]
pub fn format_timeline_tasks(weeks: &[TimelineWeek]) -> String {
    let mut s = String::new();
    for task in weeks.iter().flat_map(|week| &week.tasks) {
        let _ = writeln!(s, "- {task}");
    }
    s.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts how often each template is requested.
    #[derive(Default)]
    struct CountingSource {
        loads: Arc<AtomicUsize>,
    }

    impl PromptSource for CountingSource {
        fn load_template(&self, section: Section) -> Option<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            (section == Section::Summary).then(|| "custom {proposal}".to_string())
        }
    }

    mod cache {
        use super::*;

        #[test]
        fn loads_each_section_once() {
            let loads = Arc::new(AtomicUsize::new(0));
            let cache = PromptCache::new(CountingSource {
                loads: Arc::clone(&loads),
            });

            let first = cache.template(Section::Summary);
            let second = cache.template(Section::Summary);

            assert_eq!(&*first, "custom {proposal}");
            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(loads.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn missing_override_is_memoized_too() {
            let loads = Arc::new(AtomicUsize::new(0));
            let cache = PromptCache::new(CountingSource {
                loads: Arc::clone(&loads),
            });

            assert_eq!(&*cache.template(Section::Roles), ROLES_TEMPLATE);
            assert_eq!(&*cache.template(Section::Roles), ROLES_TEMPLATE);
            assert_eq!(loads.load(Ordering::SeqCst), 1);
            assert_eq!(cache.len(), 1);
        }

        #[test]
        fn builtin_cache_serves_defaults() {
            let cache = PromptCache::default();
            assert!(cache.is_empty());
            for section in Section::all() {
                assert_eq!(&*cache.template(*section), default_template(*section));
            }
        }
    }

    mod files {
        use super::*;

        #[test]
        fn reads_section_file() -> anyhow::Result<()> {
            let temp_dir = TempDir::new()?;
            std::fs::write(temp_dir.path().join("backlog.txt"), "Backlog for {proposal}")?;
            let source = FilePromptSource::new(temp_dir.path());

            assert_eq!(
                source.load_template(Section::Backlog).as_deref(),
                Some("Backlog for {proposal}")
            );
            assert_eq!(source.load_template(Section::Summary), None);
            Ok(())
        }

        #[test]
        fn empty_file_falls_back_to_builtin() -> anyhow::Result<()> {
            let temp_dir = TempDir::new()?;
            std::fs::write(temp_dir.path().join("roles.txt"), "  \n")?;
            let cache = PromptCache::new(FilePromptSource::new(temp_dir.path()));

            assert_eq!(&*cache.template(Section::Roles), ROLES_TEMPLATE);
            Ok(())
        }

        #[test]
        fn missing_directory_is_not_an_error() {
            let source = FilePromptSource::new(Path::new("/nonexistent/prompts/dir"));
            assert_eq!(source.load_template(Section::Timeline), None);
        }
    }

    mod rendering {
        use super::*;

        #[test]
        fn render_replaces_every_occurrence() {
            let text = render("{a} and {a} but {b} stays {c}", &[("a", "x"), ("b", "y")]);
            assert_eq!(text, "x and x but y stays {c}");
        }

        #[test]
        fn placeholders_inside_values_are_kept_verbatim() {
            let text = render(
                "{proposal}|{summary}",
                &[("proposal", "use {summary} braces"), ("summary", "S")],
            );
            assert_eq!(text, "use {summary} braces|S");
        }

        #[test]
        fn value_naming_a_later_variable_is_not_expanded() {
            let text = render("{features} then {goals}", &[("features", "{goals}"), ("goals", "G")]);
            assert_eq!(text, "{goals} then G");
        }

        #[test]
        fn builtin_templates_mention_their_prefix() {
            assert!(SUMMARY_TEMPLATE.contains("summary:"));
            assert!(FEATURES_TEMPLATE.contains("features:"));
            assert!(ROLES_TEMPLATE.contains("roles:"));
            assert!(TIMELINE_TEMPLATE.contains("week_number:"));
            assert!(BACKLOG_TEMPLATE.contains("-Task"));
        }

        #[test]
        fn goals_are_numbered_feature_titles() {
            let features = vec![
                Feature {
                    title: "Login".to_string(),
                    description: "sign in".to_string(),
                },
                Feature {
                    title: "Reports".to_string(),
                    description: String::new(),
                },
            ];

            assert_eq!(format_goals(&features), "1. Login\n2. Reports");
            assert_eq!(format_features(&features), "- Login: sign in\n- Reports");
        }

        #[test]
        fn timeline_tasks_are_flattened() {
            let weeks = vec![
                TimelineWeek {
                    week_number: 1,
                    goal: "A".to_string(),
                    tasks: vec!["one".to_string(), "two".to_string()],
                },
                TimelineWeek {
                    week_number: 2,
                    goal: "B".to_string(),
                    tasks: vec!["three".to_string()],
                },
            ];

            assert_eq!(format_timeline_tasks(&weeks), "- one\n- two\n- three");
        }
    }
}
