//! Loading persisted documents written by any schema generation.
//!
//! Three shapes have been written over time:
//!
//! | generation | shape                                                        |
//! |------------|--------------------------------------------------------------|
//! | 1          | `{ goal, tasks }` (a single implicit mountain)               |
//! | 2          | `{ mountains, currentMountainId }`                            |
//! | 3          | generation 2 plus `taskGenerationPrompt`, `timeOfDay`, `version` |
//!
//! [`StoredDocument::detect`] classifies a raw JSON value, using the
//! `version` tag when present and falling back to structural checks for
//! untagged documents. Each generation upgrades through its own function.
//!
//! Loading never fails: unparseable or unrecognised input becomes
//! [`PersistedState::fresh`]. Upgrading a current document returns it
//! unchanged.

use std::collections::HashSet;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{
    new_id, Mountain, PersistedState, Task, TimeOfDay, CURRENT_VERSION, MAX_PROMPT_LENGTH,
};

/// A raw document classified by schema generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument {
    Legacy(LegacyDocument),
    MultiMountain(MultiMountainDocument),
    Current(MultiMountainDocument),
}

/// Generation 1: one goal and its tasks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LegacyDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    pub goal: String,
    #[serde(default, deserialize_with = "lenient_array")]
    pub tasks: Vec<Value>,
}

/// Generations 2 and 3. Fields added in generation 3 are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiMountainDocument {
    #[serde(default, deserialize_with = "lenient_array")]
    pub mountains: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub current_mountain_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub task_generation_prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub time_of_day: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMountain {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    goal: String,
    #[serde(default, deserialize_with = "lenient_array")]
    tasks: Vec<Value>,
    #[serde(default)]
    created_at: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    id: Option<String>,
    text: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    done: bool,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    photo: Option<String>,
}

fn lenient_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_opt_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_array<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    })
}

fn lenient_bool<'de, D: serde::Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(d)?, Value::Bool(true)))
}

impl StoredDocument {
    /// Classify a raw value. `None` means nothing recoverable is in it.
    pub fn detect(value: Value) -> Option<Self> {
        let Value::Object(map) = &value else {
            return None;
        };

        let has_mountains = map.get("mountains").is_some_and(Value::is_array);
        // A single-goal body wins over a version stamp that claims mountains.
        let single_goal = !has_mountains && (map.contains_key("goal") || map.contains_key("tasks"));

        match map.get("version").and_then(Value::as_u64) {
            Some(v) if v >= u64::from(CURRENT_VERSION) && !single_goal => {
                if v > u64::from(CURRENT_VERSION) {
                    tracing::warn!("Document version {} is newer than {}", v, CURRENT_VERSION);
                }
                return serde_json::from_value(value).ok().map(Self::Current);
            }
            Some(2) if !single_goal => {
                return serde_json::from_value(value).ok().map(Self::MultiMountain)
            }
            Some(1) => return serde_json::from_value(value).ok().map(Self::Legacy),
            _ => {}
        }

        if has_mountains {
            serde_json::from_value(value).ok().map(Self::MultiMountain)
        } else if single_goal {
            serde_json::from_value(value).ok().map(Self::Legacy)
        } else {
            None
        }
    }

    /// Schema generation this document was written by.
    pub fn generation(&self) -> u32 {
        match self {
            Self::Legacy(_) => 1,
            Self::MultiMountain(_) => 2,
            Self::Current(_) => CURRENT_VERSION,
        }
    }

    pub fn into_state(self) -> PersistedState {
        match self {
            Self::Legacy(doc) => upgrade_legacy(doc),
            Self::MultiMountain(doc) => upgrade_multi_mountain(doc),
            Self::Current(doc) => load_current(doc),
        }
    }
}

/// Wrap a generation 1 document in a freshly created mountain.
pub fn upgrade_legacy(doc: LegacyDocument) -> PersistedState {
    let mountain = Mountain::with_goal(doc.goal, normalize_tasks(doc.tasks));
    PersistedState {
        version: CURRENT_VERSION,
        current_mountain_id: mountain.id.clone(),
        mountains: vec![mountain],
        task_generation_prompt: String::new(),
        time_of_day: TimeOfDay::default(),
    }
}

/// Fill the preferences generation 2 did not have.
pub fn upgrade_multi_mountain(doc: MultiMountainDocument) -> PersistedState {
    load_current(doc)
}

/// Normalize a generation 3 document, restoring invariants if it is damaged.
pub fn load_current(doc: MultiMountainDocument) -> PersistedState {
    let mountains = normalize_mountains(doc.mountains);
    let current_mountain_id = match doc.current_mountain_id {
        Some(id) if mountains.iter().any(|m| m.id == id) => id,
        _ => mountains[0].id.clone(),
    };
    let time_of_day = doc
        .time_of_day
        .as_deref()
        .and_then(TimeOfDay::from_str)
        .unwrap_or_default();

    PersistedState {
        version: CURRENT_VERSION,
        mountains,
        current_mountain_id,
        task_generation_prompt: clamp_prompt(doc.task_generation_prompt.unwrap_or_default()),
        time_of_day,
    }
}

/// Load a document from its JSON text. Never fails.
pub fn migrate_str(raw: &str) -> PersistedState {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => migrate_value(value),
        Err(e) => {
            tracing::warn!("Stored document is not valid JSON, starting fresh: {}", e);
            PersistedState::fresh()
        }
    }
}

/// Load a document from a parsed JSON value. Never fails.
pub fn migrate_value(value: Value) -> PersistedState {
    match StoredDocument::detect(value) {
        Some(doc) => {
            let generation = doc.generation();
            if generation < CURRENT_VERSION {
                tracing::info!(
                    "Upgrading document from generation {} to {}",
                    generation,
                    CURRENT_VERSION
                );
            }
            doc.into_state()
        }
        None => {
            tracing::warn!("Stored document has no recognisable shape, starting fresh");
            PersistedState::fresh()
        }
    }
}

/// Truncate a prompt to [`MAX_PROMPT_LENGTH`] characters.
pub fn clamp_prompt(prompt: String) -> String {
    if prompt.chars().count() <= MAX_PROMPT_LENGTH {
        prompt
    } else {
        prompt.chars().take(MAX_PROMPT_LENGTH).collect()
    }
}

fn normalize_mountains(raw: Vec<Value>) -> Vec<Mountain> {
    let mut seen = HashSet::new();
    let mut mountains: Vec<Mountain> = raw
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawMountain>(v).ok())
        .map(|m| {
            let id = match m.id {
                Some(id) if !id.is_empty() && !seen.contains(&id) => id,
                _ => new_id(),
            };
            seen.insert(id.clone());
            Mountain {
                id,
                goal: m.goal,
                tasks: normalize_tasks(m.tasks),
                created_at: parse_created_at(m.created_at),
            }
        })
        .collect();

    if mountains.is_empty() {
        mountains.push(Mountain::new());
    }
    mountains
}

fn normalize_tasks(raw: Vec<Value>) -> Vec<Task> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|v| serde_json::from_value::<RawTask>(v).ok())
        .map(|t| {
            let id = match t.id {
                Some(id) if !id.is_empty() && !seen.contains(&id) => id,
                _ => new_id(),
            };
            seen.insert(id.clone());
            Task {
                id,
                text: t.text,
                done: t.done,
                photo: t.photo,
            }
        })
        .collect()
}

/// Accepts epoch milliseconds or an RFC 3339 string; anything else is now.
fn parse_created_at(raw: Option<Value>) -> DateTime<Utc> {
    let parsed = match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(3)),
        _ => None,
    };
    parsed.unwrap_or_else(|| Utc::now().trunc_subsecs(3))
}
