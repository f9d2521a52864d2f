use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::{new_id, Task};

/// One expedition: a goal and the ordered ledges leading to it.
///
/// The `id` doubles as the seed for the climb path, so a mountain keeps the
/// same staircase shape for its whole life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mountain {
    pub id: String,
    /// Free-text summit name. Empty until the user sets one.
    pub goal: String,
    pub tasks: Vec<Task>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Mountain {
    /// An empty mountain created now.
    pub fn new() -> Self {
        Self::with_goal(String::new(), Vec::new())
    }

    /// A mountain wrapping an existing goal and task list.
    pub fn with_goal(goal: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            id: new_id(),
            goal: goal.into(),
            tasks,
            // The wire format keeps milliseconds only.
            created_at: Utc::now().trunc_subsecs(3),
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// The goal, or a placeholder label when none is set.
    pub fn title(&self) -> &str {
        let goal = self.goal.trim();
        if goal.is_empty() {
            "Untitled mountain"
        } else {
            goal
        }
    }
}

impl Default for Mountain {
    fn default() -> Self {
        Self::new()
    }
}

/// Input for renaming a mountain's goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMountainInput {
    pub goal: String,
}

/// Compact listing entry for a mountain switcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountainSummary {
    pub id: String,
    pub title: String,
    pub done: usize,
    pub total: usize,
    pub percent: u8,
    pub is_current: bool,
}
