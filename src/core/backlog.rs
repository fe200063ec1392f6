//! The four-level work breakdown: Epic → Sub-Epic → User Story → Task.
//!
//! Each child list is owned by its parent. Trees are built once by the
//! parser and not mutated afterwards.

use serde::{Deserialize, Serialize};

/// Status every generated task starts with.
pub const PENDING: &str = "pending";

/// Who authored a node. Only the persistence layer cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Generated,
    Authored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    pub description: String,
    pub status: String,
    pub origin: Origin,
}

impl Task {
    /// A pending, machine-generated task.
    #[must_use]
    pub fn generated(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            status: PENDING.to_string(),
            origin: Origin::Generated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStory {
    pub title: String,
    pub tasks: Vec<Task>,
    pub origin: Origin,
}

impl UserStory {
    #[must_use]
    pub fn generated(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            tasks: Vec::new(),
            origin: Origin::Generated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubEpic {
    pub title: String,
    pub user_stories: Vec<UserStory>,
    pub origin: Origin,
}

impl SubEpic {
    #[must_use]
    pub fn generated(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            user_stories: Vec::new(),
            origin: Origin::Generated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epic {
    pub title: String,
    pub description: String,
    pub sub_epics: Vec<SubEpic>,
    pub origin: Origin,
}

impl Epic {
    #[must_use]
    pub fn generated(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            sub_epics: Vec::new(),
            origin: Origin::Generated,
        }
    }

    /// Number of tasks anywhere under this epic.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.sub_epics
            .iter()
            .flat_map(|sub_epic| &sub_epic.user_stories)
            .map(|story| story.tasks.len())
            .sum()
    }
}

/// A parsed backlog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlog {
    pub epics: Vec<Epic>,
}

impl Backlog {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epics.is_empty()
    }

    /// Number of tasks in the whole tree.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.epics.iter().map(Epic::task_count).sum()
    }
}
