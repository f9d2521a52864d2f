use serde::{Deserialize, Serialize};

use super::Mountain;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 3;

/// Upper bound on the stored task generation prompt, in characters.
pub const MAX_PROMPT_LENGTH: usize = 200;

/// The whole per-user document, as stored locally or remotely.
///
/// `mountains` is never empty and `current_mountain_id` always names one of
/// them. [`crate::migration`] restores both invariants on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    pub mountains: Vec<Mountain>,
    pub current_mountain_id: String,
    pub task_generation_prompt: String,
    pub time_of_day: TimeOfDay,
}

impl PersistedState {
    /// Fresh state for a first-time user: one empty mountain.
    pub fn fresh() -> Self {
        let mountain = Mountain::new();
        Self {
            version: CURRENT_VERSION,
            current_mountain_id: mountain.id.clone(),
            mountains: vec![mountain],
            task_generation_prompt: String::new(),
            time_of_day: TimeOfDay::default(),
        }
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Cosmetic sky setting for the scene.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Day,
    Sunset,
    #[default]
    Night,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Sunset => "sunset",
            Self::Night => "night",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "day" => Some(Self::Day),
            "sunset" => Some(Self::Sunset),
            "night" => Some(Self::Night),
            _ => None,
        }
    }
}

/// Input for updating global preferences. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesInput {
    pub task_generation_prompt: Option<String>,
    pub time_of_day: Option<TimeOfDay>,
}
