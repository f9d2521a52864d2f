//! Display scalars derived from a task list.
//!
//! Everything here is a total function: empty lists, empty goals and any
//! mix of done/not-done tasks produce a value, never an error.

use serde::{Deserialize, Serialize};

use crate::models::Task;

/// Altitude shown at the summit, in "meters".
pub const MAX_ALTITUDE: u32 = 4000;

pub fn done_count(tasks: &[Task]) -> usize {
    tasks.iter().filter(|t| t.done).count()
}

fn ratio_rounded(tasks: &[Task], scale: u32) -> u32 {
    if tasks.is_empty() {
        return 0;
    }
    let done = done_count(tasks);
    let total = tasks.len();
    let value = (f64::from(scale) * done as f64 / total as f64).round() as u32;
    // Rounding must not reach the top before the last task is done.
    if done < total {
        value.min(scale - 1)
    } else {
        scale
    }
}

/// Percentage of tasks done, rounded to the nearest integer. 0 for no tasks.
pub fn completion_percent(tasks: &[Task]) -> u8 {
    ratio_rounded(tasks, 100) as u8
}

/// Altitude proportional to completion, scaled to [`MAX_ALTITUDE`].
pub fn altitude(tasks: &[Task]) -> u32 {
    ratio_rounded(tasks, MAX_ALTITUDE)
}

/// True once there is at least one task and the percentage is 100,
/// which only happens when every task is done.
pub fn is_summit_reached(tasks: &[Task]) -> bool {
    !tasks.is_empty() && completion_percent(tasks) == 100
}

/// Encouragement shown next to the mountain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Motivation {
    /// No goal and no tasks yet.
    Empty,
    /// A goal but nothing to climb.
    GoalOnly,
    /// Tasks exist, none done.
    HasTasks,
    /// Up to 25%.
    OnTheTrail,
    /// Up to 50%.
    Halfway,
    /// Up to 75%.
    Close,
    /// Anything short of 100%.
    FinalPush,
    Summit,
}

impl Motivation {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Set your summit and add ledges. Every step takes you higher.",
            Self::GoalOnly => "Add tasks, each one is a ledge on your way to the summit.",
            Self::HasTasks => "Complete tasks to climb. You've got this.",
            Self::OnTheTrail => "You're on the trail. Keep moving.",
            Self::Halfway => "Halfway up, the view is already changing.",
            Self::Close => "So close. One ledge at a time.",
            Self::FinalPush => "The summit is right there. Finish strong.",
            Self::Summit => "You reached the summit. New heights unlocked.",
        }
    }

    fn for_percent(percent: u8) -> Self {
        match percent {
            0..=25 => Self::OnTheTrail,
            26..=50 => Self::Halfway,
            51..=75 => Self::Close,
            76..=99 => Self::FinalPush,
            _ => Self::Summit,
        }
    }
}

/// Pick the motivation bucket for a mountain.
///
/// A goal made only of whitespace counts as no goal.
pub fn motivation(goal: &str, tasks: &[Task], percent: u8) -> Motivation {
    let has_goal = !goal.trim().is_empty();
    match (has_goal, tasks.is_empty()) {
        (false, true) => Motivation::Empty,
        (true, true) => Motivation::GoalOnly,
        _ if percent == 0 => Motivation::HasTasks,
        _ => Motivation::for_percent(percent),
    }
}

/// Everything the scene and the progress meter need, computed in one pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub done: usize,
    pub total: usize,
    pub percent: u8,
    pub altitude: u32,
    pub summit_reached: bool,
    pub motivation: Motivation,
    pub message: String,
}

impl ProgressReport {
    pub fn compute(goal: &str, tasks: &[Task]) -> Self {
        let percent = completion_percent(tasks);
        let motivation = motivation(goal, tasks, percent);
        Self {
            done: done_count(tasks),
            total: tasks.len(),
            percent,
            altitude: altitude(tasks),
            summit_reached: is_summit_reached(tasks),
            motivation,
            message: motivation.message().to_string(),
        }
    }
}
