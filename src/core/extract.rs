//! Field extraction for the flat sections (summary, features, roles,
//! timeline).
//!
//! Like the backlog parser, extraction is lenient: lines that do not fit the
//! expected shape are skipped and an empty section yields an empty value.

use serde::{Deserialize, Serialize};

use crate::core::sections::{
    BULLET, FEATURES_PREFIX, ROLES_PREFIX, SUMMARY_PREFIX, TIMELINE_MARKER, WEEK_NUMBER_KEY,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub responsibilities: String,
}

/// One week of the delivery timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineWeek {
    pub week_number: u32,
    pub goal: String,
    pub tasks: Vec<String>,
}

/// Returns the summary text with its `summary:` prefix removed.
#[must_use]
pub fn extract_summary(text: &str) -> String {
    let text = text.trim();
    text.strip_prefix(SUMMARY_PREFIX)
        .unwrap_or(text)
        .trim()
        .to_string()
}

/// Extracts `- Title: description` bullets from a features section.
#[must_use]
pub fn extract_features(text: &str) -> Vec<Feature> {
    bullets_after(text, FEATURES_PREFIX)
        .map(|(title, description)| Feature {
            title: title.to_string(),
            description: description.to_string(),
        })
        .collect()
}

/// Extracts `- Role: responsibilities` bullets from a roles section.
#[must_use]
pub fn extract_roles(text: &str) -> Vec<Role> {
    bullets_after(text, ROLES_PREFIX)
        .map(|(name, responsibilities)| Role {
            name: name.to_string(),
            responsibilities: responsibilities.to_string(),
        })
        .collect()
}

/// Splits `- Name: rest` bullets into name and rest. Bullets without a colon
/// keep an empty rest; bullets with an empty name are skipped.
fn bullets_after<'a>(text: &'a str, prefix: &str) -> impl Iterator<Item = (&'a str, &'a str)> {
    let body = text.trim().strip_prefix(prefix).unwrap_or(text);
    body.lines()
        .filter_map(|line| line.trim_start().strip_prefix(BULLET))
        .map(|item| {
            let (name, rest) = item.split_once(':').unwrap_or((item, ""));
            (strip_emphasis(name), rest.trim())
        })
        .filter(|(name, _)| !name.is_empty())
}

fn strip_emphasis(s: &str) -> &str {
    s.trim().trim_matches('*').trim()
}

/// Extracts timeline weeks.
///
/// A week starts at every `week_number:` line; `goal:` sets its goal and the
/// bullets that follow `tasks:` become its tasks. Weeks whose number does not
/// parse are skipped together with their lines.
#[must_use]
pub fn extract_timeline(text: &str) -> Vec<TimelineWeek> {
    let mut weeks: Vec<TimelineWeek> = Vec::new();
    let mut current: Option<TimelineWeek> = None;
    let mut skipping = false;

    for line in text.lines().map(str::trim) {
        let key_line = line.strip_prefix(BULLET).unwrap_or(line);
        if let Some(number) = key_line.strip_prefix(WEEK_NUMBER_KEY) {
            weeks.extend(current.take());
            match number.trim().parse::<u32>() {
                Ok(week_number) => {
                    current = Some(TimelineWeek {
                        week_number,
                        goal: String::new(),
                        tasks: Vec::new(),
                    });
                    skipping = false;
                }
                Err(_) => skipping = true,
            }
            continue;
        }
        if skipping {
            continue;
        }
        let Some(week) = current.as_mut() else {
            continue;
        };
        if let Some(goal) = key_line.strip_prefix("goal:") {
            week.goal = goal.trim().to_string();
        } else if key_line.starts_with("tasks:") || line.starts_with(TIMELINE_MARKER) {
            continue;
        } else if let Some(task) = line.strip_prefix(BULLET) {
            let task = task.trim();
            if !task.is_empty() {
                week.tasks.push(task.to_string());
            }
        }
    }
    weeks.extend(current);
    weeks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prefix_is_removed() {
        assert_eq!(extract_summary("summary:  A tool for teams.\n"), "A tool for teams.");
    }

    #[test]
    fn empty_summary_stays_empty() {
        assert_eq!(extract_summary(""), "");
    }

    #[test]
    fn features_split_on_first_colon() {
        let text = "features:\n- Login: email: and password\n- **Reports**: monthly\nnoise\n- Export";
        let features = extract_features(text);

        assert_eq!(
            features,
            vec![
                Feature {
                    title: "Login".to_string(),
                    description: "email: and password".to_string(),
                },
                Feature {
                    title: "Reports".to_string(),
                    description: "monthly".to_string(),
                },
                Feature {
                    title: "Export".to_string(),
                    description: String::new(),
                },
            ]
        );
    }

    #[test]
    fn roles_skip_empty_names() {
        let text = "roles:\n- Admin: manages users\n- : nobody\n  - Viewer: reads";
        let roles = extract_roles(text);

        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].name, "Admin");
        assert_eq!(roles[1].responsibilities, "reads");
    }

    #[test]
    fn empty_sections_yield_nothing() {
        assert!(extract_features("").is_empty());
        assert!(extract_roles("").is_empty());
        assert!(extract_timeline("").is_empty());
    }

    mod timeline {
        use super::*;

        const TIMELINE: &str = "\
timeline:
- week_number: 1
  goal: Login
  tasks:
  - Build login form
  - Create session API
- week_number: 2
  goal: Reports
  tasks:
  - Render charts
";

        #[test]
        fn parses_weeks_goals_and_tasks() {
            let weeks = extract_timeline(TIMELINE);

            assert_eq!(weeks.len(), 2);
            assert_eq!(weeks[0].week_number, 1);
            assert_eq!(weeks[0].goal, "Login");
            assert_eq!(weeks[0].tasks, vec!["Build login form", "Create session API"]);
            assert_eq!(weeks[1].tasks, vec!["Render charts"]);
        }

        #[test]
        fn skips_weeks_with_bad_numbers() {
            let text = "timeline:\nweek_number: soon\ngoal: X\n- lost\nweek_number: 3\ngoal: Y";
            let weeks = extract_timeline(text);

            assert_eq!(weeks.len(), 1);
            assert_eq!(weeks[0].week_number, 3);
            assert_eq!(weeks[0].goal, "Y");
            assert!(weeks[0].tasks.is_empty());
        }

        #[test]
        fn ignores_lines_before_first_week() {
            let weeks = extract_timeline("timeline:\n- stray\nweek_number: 1\n- kept");

            assert_eq!(weeks.len(), 1);
            assert_eq!(weeks[0].tasks, vec!["kept"]);
        }
    }
}
