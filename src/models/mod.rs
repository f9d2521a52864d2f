//! Domain models for Summit.
//!
//! # Core Concepts
//!
//! - [`PersistedState`]: The per-user document. Holds every expedition plus
//!   global preferences, and is the unit of persistence and migration.
//! - [`Mountain`]: One expedition: a goal (the summit) and an ordered list of
//!   tasks leading to it. A user always has at least one.
//! - [`Task`]: A ledge on the climb. Completing tasks moves the climber up
//!   the mountain's staircase.
//! - [`Photo`]: An image a user attached to a task, kept in the photo store
//!   and referenced from the task by URL.

mod mountain;
mod photo;
mod state;
mod task;

pub use mountain::*;
pub use photo::*;
pub use state::*;
pub use task::*;

use chrono::Utc;
use uuid::Uuid;

/// Generate an opaque id: base-36 millisecond timestamp plus a random suffix.
pub fn new_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", to_base36(millis), &suffix[..10])
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
