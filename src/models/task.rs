use serde::{Deserialize, Serialize};

use super::new_id;

/// A single ledge on the way to the summit.
///
/// Order within a mountain's task list is the climb order: the first task is
/// the ledge nearest the base, the last one sits just below the summit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
    pub done: bool,
    /// Inline `data:` image or a URL into the photo store. Written as `null`
    /// when absent.
    #[serde(default)]
    pub photo: Option<String>,
}

impl Task {
    /// Create a not-yet-done task with a fresh id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            text: text.into(),
            done: false,
            photo: None,
        }
    }
}

/// Input for adding a task to a mountain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub text: String,
}

/// Input for attaching, replacing or clearing a task photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePhotoInput {
    pub photo: Option<String>,
}
