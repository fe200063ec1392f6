//! Line-oriented parsing of generated backlog text.
//!
//! The grammar has five line kinds: epic, sub-epic, user story, task and
//! everything else. [`classify`] recognizes a single line and
//! [`TreeBuilder`] folds the recognized lines into a [`Backlog`]. There is
//! no closing token; a node stays current until a sibling at the same or a
//! higher level replaces it. Lines that do not fit are dropped, so parsing
//! never fails.
//!
//! [`repair`] then pads the tree with synthetic epics until it has the
//! minimum number of epics, so callers always get a usable shape.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::core::backlog::{Backlog, Epic, SubEpic, Task, UserStory};

const EPIC_PREFIX: &str = "Epic";
const SUB_EPIC_PREFIX: &str = "-Sub-Epic";
const USER_STORY_PREFIX: &str = "-User Story";
const TASK_PREFIX: &str = "-Task";

/// Description prefix for epics annotated with the timeline task they cover.
pub const COVERS_DESCRIPTION_PREFIX: &str = "Derived from task: ";

/// Description given to padded epics.
pub const SYNTHETIC_DESCRIPTION: &str = "Added to complete the backlog structure";

/// `*(covers: X)*` annotation on epic titles.
static COVERS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\*\(\s*covers:\s*(.*?)\s*\)\*").ok());

/// One recognized line of backlog text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacklogLine<'a> {
    Epic {
        title: Cow<'a, str>,
        covers: Option<&'a str>,
    },
    SubEpic(&'a str),
    UserStory(&'a str),
    Task(&'a str),
    Other,
}

/// Recognizes a single line. Surrounding whitespace is ignored.
///
/// Every `Epic ...:` line is an epic, even with an empty title; an untitled
/// epic that covers a timeline task takes the task as its title.
#[must_use]
pub fn classify(line: &str) -> BacklogLine<'_> {
    let line = line.trim();

    if line.starts_with(EPIC_PREFIX)
        && let Some((_, rest)) = line.split_once(':')
    {
        let (title, covers) = strip_covers(rest.trim());
        let title = match covers {
            Some(covered) if title.is_empty() => Cow::Borrowed(covered),
            _ => title,
        };
        return BacklogLine::Epic { title, covers };
    }

    if let Some(title) = child_title(line, SUB_EPIC_PREFIX) {
        BacklogLine::SubEpic(title)
    } else if let Some(title) = child_title(line, USER_STORY_PREFIX) {
        BacklogLine::UserStory(title)
    } else if let Some(title) = child_title(line, TASK_PREFIX) {
        BacklogLine::Task(title)
    } else {
        BacklogLine::Other
    }
}

/// Title of a child line: the text after the first colon, or everything
/// after the prefix when there is no colon. Empty titles do not count.
fn child_title<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    let title = rest.split_once(':').map_or(rest, |(_, title)| title).trim();
    (!title.is_empty()).then_some(title)
}

fn strip_covers(title: &str) -> (Cow<'_, str>, Option<&str>) {
    let Some(covers) = COVERS.as_ref() else {
        return (Cow::Borrowed(title), None);
    };
    let Some(captures) = covers.captures(title) else {
        return (Cow::Borrowed(title), None);
    };
    let covered = captures
        .get(1)
        .map(|m| m.as_str())
        .filter(|covered| !covered.is_empty());
    let stripped = covers.replace(title, "");
    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    (Cow::Owned(stripped), covered)
}

/// Folds classified lines into a tree.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    epics: Vec<Epic>,
    sub_epic_open: bool,
    user_story_open: bool,
    dropped: usize,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one line. Child lines without an open parent are dropped.
    pub fn push(&mut self, line: BacklogLine<'_>) {
        match line {
            BacklogLine::Epic { title, covers } => {
                let description = covers
                    .map(|covered| format!("{COVERS_DESCRIPTION_PREFIX}{covered}"))
                    .unwrap_or_default();
                self.epics.push(Epic::generated(title, description));
                self.sub_epic_open = false;
                self.user_story_open = false;
            }
            BacklogLine::SubEpic(title) => {
                if let Some(epic) = self.epics.last_mut() {
                    epic.sub_epics.push(SubEpic::generated(title));
                    self.sub_epic_open = true;
                    self.user_story_open = false;
                } else {
                    self.dropped += 1;
                }
            }
            BacklogLine::UserStory(title) => {
                if let Some(sub_epic) = self.current_sub_epic() {
                    sub_epic.user_stories.push(UserStory::generated(title));
                    self.user_story_open = true;
                } else {
                    self.dropped += 1;
                }
            }
            BacklogLine::Task(title) => {
                if let Some(story) = self.current_user_story() {
                    story.tasks.push(Task::generated(title));
                } else {
                    self.dropped += 1;
                }
            }
            BacklogLine::Other => {}
        }
    }

    fn current_sub_epic(&mut self) -> Option<&mut SubEpic> {
        if !self.sub_epic_open {
            return None;
        }
        self.epics.last_mut()?.sub_epics.last_mut()
    }

    fn current_user_story(&mut self) -> Option<&mut UserStory> {
        if !self.user_story_open {
            return None;
        }
        self.current_sub_epic()?.user_stories.last_mut()
    }

    /// Number of child lines dropped for lack of a parent.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn finish(self) -> Backlog {
        Backlog { epics: self.epics }
    }
}

/// Parses raw backlog text. Never fails; unusable lines are skipped.
#[must_use]
pub fn parse_backlog(text: &str) -> Backlog {
    let mut builder = TreeBuilder::new();
    for line in text.lines() {
        builder.push(classify(line));
    }
    if builder.dropped() > 0 {
        debug!(dropped = builder.dropped(), "dropped orphaned backlog lines");
    }
    builder.finish()
}

/// Parses raw backlog text and pads the result to at least `min_epics`.
#[must_use]
pub fn parse_and_repair(text: &str, min_epics: usize) -> Backlog {
    repair(parse_backlog(text), min_epics)
}

struct EpicTemplate {
    title: &'static str,
    sub_epic: &'static str,
    user_story: &'static str,
    tasks: [&'static str; 2],
}

const CATALOG: &[EpicTemplate] = &[
    EpicTemplate {
        title: "User Interface",
        sub_epic: "Core Screens",
        user_story: "As a user, I want a clear and responsive interface so that I can finish my work quickly",
        tasks: [
            "Design the main layout and navigation",
            "Implement responsive screens",
        ],
    },
    EpicTemplate {
        title: "Data Management",
        sub_epic: "Data Model",
        user_story: "As an administrator, I want data stored reliably so that nothing is lost",
        tasks: ["Design the database schema", "Implement the data access layer"],
    },
    EpicTemplate {
        title: "Security",
        sub_epic: "Access Control",
        user_story: "As a user, I want my account protected so that my data stays private",
        tasks: ["Implement authentication", "Add role-based authorization"],
    },
    EpicTemplate {
        title: "Testing",
        sub_epic: "Quality Assurance",
        user_story: "As a developer, I want automated tests so that regressions are caught early",
        tasks: [
            "Write unit tests for core modules",
            "Set up continuous integration",
        ],
    },
    EpicTemplate {
        title: "Performance",
        sub_epic: "Optimization",
        user_story: "As a user, I want fast responses so that the system never slows me down",
        tasks: ["Profile critical paths", "Cache frequent queries"],
    },
    EpicTemplate {
        title: "Deployment",
        sub_epic: "Release Pipeline",
        user_story: "As an operator, I want repeatable deployments so that releases are predictable",
        tasks: [
            "Containerize the application",
            "Automate production deployment",
        ],
    },
    EpicTemplate {
        title: "Documentation",
        sub_epic: "Guides",
        user_story: "As a new team member, I want current documentation so that I can onboard quickly",
        tasks: ["Write the setup guide", "Document the public APIs"],
    },
    EpicTemplate {
        title: "Integration",
        sub_epic: "External Services",
        user_story: "As a user, I want the system to work with my existing tools so that I avoid double entry",
        tasks: [
            "Define integration contracts",
            "Implement third-party connectors",
        ],
    },
];

impl EpicTemplate {
    fn build(&self, title: String) -> Epic {
        let mut story = UserStory::generated(self.user_story);
        story.tasks = self.tasks.iter().map(|task| Task::generated(*task)).collect();
        let mut sub_epic = SubEpic::generated(self.sub_epic);
        sub_epic.user_stories.push(story);
        let mut epic = Epic::generated(title, SYNTHETIC_DESCRIPTION);
        epic.sub_epics.push(sub_epic);
        epic
    }
}

/// Appends synthetic epics until the backlog has `min_epics` of them.
///
/// Parsed epics are kept as they are. Catalog titles already present are
/// skipped; once the catalog runs out, titles get a round suffix.
#[must_use]
pub fn repair(mut backlog: Backlog, min_epics: usize) -> Backlog {
    if backlog.epics.len() >= min_epics {
        return backlog;
    }

    let parsed = backlog.epics.len();
    let mut taken: HashSet<String> = backlog
        .epics
        .iter()
        .map(|epic| epic.title.to_lowercase())
        .collect();

    let mut round = 1usize;
    while backlog.epics.len() < min_epics {
        for template in CATALOG {
            if backlog.epics.len() >= min_epics {
                break;
            }
            let title = if round == 1 {
                template.title.to_string()
            } else {
                format!("{} ({round})", template.title)
            };
            if taken.insert(title.to_lowercase()) {
                backlog.epics.push(template.build(title));
            }
        }
        round += 1;
    }

    info!(
        parsed,
        added = backlog.epics.len() - parsed,
        "padded backlog with synthetic epics"
    );
    backlog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backlog::Origin;
    use crate::core::sections::MIN_EPICS;

    const WELL_FORMED: &str = "\
Epic 1: Authentication *(covers: Build login form)*
-Sub-Epic 1.1: Sign in
-User Story 1.1.1: As a user, I want to sign in
-Task 1.1.1.1: Create login endpoint
-Task 1.1.1.2: Build login form
-Sub-Epic 1.2: Recovery
-User Story 1.2.1: As a user, I want to reset my password
-Task 1.2.1.1: Send reset email
Epic 2: Dashboard
-Sub-Epic 2.1: Widgets
-User Story 2.1.1: As a manager, I want a summary view
-Task 2.1.1.1: Render charts
Epic 3: Reporting
Epic 4: Billing
-Sub-Epic 4.1: Invoices
";

    // =========================================================================
    // classify
    // =========================================================================

    mod classify_tests {
        use super::*;

        #[test]
        fn epic_title_is_text_after_first_colon() {
            assert_eq!(
                classify("Epic 2: Reports: monthly"),
                BacklogLine::Epic {
                    title: Cow::Borrowed("Reports: monthly"),
                    covers: None
                }
            );
        }

        #[test]
        fn epic_without_colon_is_other() {
            assert_eq!(classify("Epic 2 Reports"), BacklogLine::Other);
        }

        #[test]
        fn epic_with_empty_title_is_still_an_epic() {
            assert_eq!(
                classify("Epic 2:   "),
                BacklogLine::Epic {
                    title: Cow::Borrowed(""),
                    covers: None
                }
            );
        }

        #[test]
        fn untitled_covering_epic_takes_covered_task_as_title() {
            assert_eq!(
                classify("Epic 2: *(covers: Render charts)*"),
                BacklogLine::Epic {
                    title: Cow::Borrowed("Render charts"),
                    covers: Some("Render charts")
                }
            );
        }

        #[test]
        fn covers_annotation_is_stripped_and_kept() {
            let BacklogLine::Epic { title, covers } =
                classify("Epic 1: Login *(covers: Build form)* flow")
            else {
                panic!("expected an epic line");
            };
            assert_eq!(title, "Login flow");
            assert_eq!(covers, Some("Build form"));
        }

        #[test]
        fn child_lines_are_recognized() {
            assert_eq!(classify("  -Sub-Epic 1.1: Sign in"), BacklogLine::SubEpic("Sign in"));
            assert_eq!(
                classify("-User Story 1.1.1: As a user"),
                BacklogLine::UserStory("As a user")
            );
            assert_eq!(classify("-Task 1.1.1.1: Do it"), BacklogLine::Task("Do it"));
        }

        #[test]
        fn child_without_colon_keeps_remainder() {
            assert_eq!(classify("-Task write docs"), BacklogLine::Task("write docs"));
        }

        #[test]
        fn bare_prefix_is_other() {
            assert_eq!(classify("-Task"), BacklogLine::Other);
            assert_eq!(classify("-Sub-Epic 1.1:"), BacklogLine::Other);
        }

        #[test]
        fn unrelated_lines_are_other() {
            assert_eq!(classify(""), BacklogLine::Other);
            assert_eq!(classify("Here is your backlog:"), BacklogLine::Other);
            assert_eq!(classify("Task 1: no dash"), BacklogLine::Other);
        }
    }

    // =========================================================================
    // parse_backlog
    // =========================================================================

    mod parse {
        use super::*;

        #[test]
        fn builds_nested_tree() {
            let backlog = parse_backlog(WELL_FORMED);

            assert_eq!(backlog.epics.len(), 4);
            let auth = &backlog.epics[0];
            assert_eq!(auth.title, "Authentication");
            assert_eq!(auth.description, "Derived from task: Build login form");
            assert_eq!(auth.sub_epics.len(), 2);
            assert_eq!(auth.sub_epics[0].user_stories[0].tasks.len(), 2);
            assert_eq!(
                auth.sub_epics[1].user_stories[0].tasks[0].title,
                "Send reset email"
            );
            assert_eq!(backlog.epics[2].sub_epics.len(), 0);
            assert_eq!(backlog.epics[3].sub_epics[0].user_stories.len(), 0);
            assert_eq!(backlog.task_count(), 4);
        }

        #[test]
        fn every_node_is_generated_and_pending() {
            let backlog = parse_backlog(WELL_FORMED);
            let task = &backlog.epics[0].sub_epics[0].user_stories[0].tasks[0];

            assert_eq!(backlog.epics[0].origin, Origin::Generated);
            assert_eq!(task.status, "pending");
            assert!(task.description.is_empty());
        }

        #[test]
        fn orphan_task_is_dropped_and_parsing_continues() {
            let text = "\
-Task 0: orphan
Epic 1: A
-Task 1: still orphan, no story yet
-Sub-Epic 1.1: S
-User Story 1.1.1: U
-Task 1.1.1.1: kept";
            let backlog = parse_backlog(text);

            assert_eq!(backlog.epics.len(), 1);
            assert_eq!(backlog.task_count(), 1);
            assert_eq!(
                backlog.epics[0].sub_epics[0].user_stories[0].tasks[0].title,
                "kept"
            );
        }

        #[test]
        fn new_epic_closes_previous_sub_epic_and_story() {
            let text = "\
Epic 1: A
-Sub-Epic 1.1: S
-User Story 1.1.1: U
Epic 2: B
-User Story 2.0.1: belongs nowhere
-Task 2.0.1.1: belongs nowhere";
            let backlog = parse_backlog(text);

            assert_eq!(backlog.epics[0].sub_epics[0].user_stories.len(), 1);
            assert!(backlog.epics[1].sub_epics.is_empty());
            assert_eq!(backlog.task_count(), 0);
        }

        #[test]
        fn children_of_untitled_epic_stay_with_it() {
            let text = "\
Epic 1: Auth
-Sub-Epic 1.1: Login
Epic 2: *(covers: Render charts)*
-Sub-Epic 2.1: Charts
-User Story 2.1.1: As a manager, I want charts so that I track progress
-Task 2.1.1.1: Draw the chart
Epic 3:
-Sub-Epic 3.1: Misc";
            let backlog = parse_backlog(text);

            assert_eq!(backlog.epics.len(), 3);
            assert_eq!(backlog.epics[0].sub_epics.len(), 1);
            assert_eq!(backlog.epics[0].sub_epics[0].title, "Login");

            let covering = &backlog.epics[1];
            assert_eq!(covering.title, "Render charts");
            assert_eq!(covering.description, "Derived from task: Render charts");
            assert_eq!(covering.sub_epics[0].title, "Charts");
            assert_eq!(covering.task_count(), 1);

            assert!(backlog.epics[2].title.is_empty());
            assert_eq!(backlog.epics[2].sub_epics[0].title, "Misc");
        }

        #[test]
        fn new_sub_epic_closes_previous_story() {
            let text = "\
Epic 1: A
-Sub-Epic 1.1: S
-User Story 1.1.1: U
-Sub-Epic 1.2: T
-Task 1.2.0.1: orphan";
            let backlog = parse_backlog(text);

            assert_eq!(backlog.task_count(), 0);
            assert_eq!(backlog.epics[0].sub_epics.len(), 2);
        }

        #[test]
        fn parsing_is_deterministic() {
            assert_eq!(parse_backlog(WELL_FORMED), parse_backlog(WELL_FORMED));
        }

        #[test]
        fn garbage_yields_empty_tree() {
            assert!(parse_backlog("lorem ipsum\n\n-Task: nope").is_empty());
        }
    }

    // =========================================================================
    // repair
    // =========================================================================

    mod repair_tests {
        use super::*;

        #[test]
        fn empty_input_gets_four_full_epics() {
            let backlog = parse_and_repair("", MIN_EPICS);

            assert_eq!(backlog.epics.len(), 4);
            let titles: Vec<&str> = backlog.epics.iter().map(|e| e.title.as_str()).collect();
            assert_eq!(
                titles,
                ["User Interface", "Data Management", "Security", "Testing"]
            );
            for epic in &backlog.epics {
                assert_eq!(epic.sub_epics.len(), 1);
                assert_eq!(epic.sub_epics[0].user_stories.len(), 1);
                assert_eq!(epic.task_count(), 2);
                assert_eq!(epic.origin, Origin::Generated);
            }
        }

        #[test]
        fn parsed_epics_come_first_and_are_untouched() {
            let text = "Epic 1: Checkout\n-Sub-Epic 1.1: Cart";
            let parsed = parse_backlog(text);
            let backlog = repair(parsed.clone(), MIN_EPICS);

            assert_eq!(backlog.epics.len(), 4);
            assert_eq!(backlog.epics[0], parsed.epics[0]);
        }

        #[test]
        fn complete_backlog_is_unchanged() {
            let parsed = parse_backlog(WELL_FORMED);
            assert_eq!(repair(parsed.clone(), MIN_EPICS), parsed);
        }

        #[test]
        fn existing_titles_are_not_duplicated() {
            let backlog = parse_and_repair("Epic 1: security\nEpic 2: Testing", MIN_EPICS);
            let titles: Vec<&str> = backlog.epics.iter().map(|e| e.title.as_str()).collect();

            assert_eq!(
                titles,
                ["security", "Testing", "User Interface", "Data Management"]
            );
        }

        #[test]
        fn large_minimum_cycles_catalog_with_suffixes() {
            let backlog = parse_and_repair("", 10);

            assert_eq!(backlog.epics.len(), 10);
            assert_eq!(backlog.epics[8].title, "User Interface (2)");
            assert_eq!(backlog.epics[9].title, "Data Management (2)");
        }

        #[test]
        fn shape_holds_for_assorted_inputs() {
            let inputs = [
                "",
                "Epic: only colon",
                "-Task 1: x\n-User Story: y",
                WELL_FORMED,
                "Epic 1: A\nEpic 2: B\nEpic 3: C\nEpic 4: D\nEpic 5: E",
                "\u{feff}Epic 1: BOM prefixed",
            ];
            for input in inputs {
                assert!(
                    parse_and_repair(input, MIN_EPICS).epics.len() >= MIN_EPICS,
                    "input {input:?}"
                );
            }
        }
    }
}
