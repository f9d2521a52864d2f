//! Climb path geometry.
//!
//! The 3D scene draws a cone with a spiral staircase wound around it. Each
//! task owns one step of the staircase (a checkpoint); completing tasks moves
//! the climber from checkpoint to checkpoint until the summit.
//!
//! The staircase is a pure function of `(task_count, seed)`. Renderers rebuild
//! it on every frame they need it, so the same inputs must yield bit-identical
//! output: nothing here reads the clock or a random source.
//!
//! - [`generate_staircase`]: the spiral and its checkpoints.
//! - [`climber_step`]: where the climber stands for a number of done tasks.
//! - [`PathCache`]: memoized staircases keyed by seed and task count.
//! - [`profile`]: the flat 2D layout used by the SVG view.

mod cache;
mod hash;
pub mod profile;

pub use cache::PathCache;
pub use hash::hash_seed_to_unit_float;

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

pub const TOTAL_ROTATIONS: u32 = 3;
pub const STEPS_PER_ROTATION: usize = 30;
/// Intervals between steps at the default resolution.
pub const BASE_INTERVALS: usize = TOTAL_ROTATIONS as usize * STEPS_PER_ROTATION;

/// Height of the first step.
pub const START_Y: f64 = -2.0;
/// Height of the last step, just below the apex.
pub const END_Y: f64 = 2.5;
/// Height of the cone's tip.
pub const APEX_Y: f64 = 3.0;
/// Cone radius at `START_Y`.
pub const BASE_RADIUS: f64 = 3.0;
/// Steps sit this far outside the cone surface.
pub const SURFACE_OFFSET: f64 = 0.2;

const WOBBLE_MIN: f64 = 0.02;
const WOBBLE_SPAN: f64 = 0.04;
const WOBBLE_LOBES: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Euler rotation in radians, XYZ order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Euler {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One step of the staircase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub position: Vec3,
    /// Faces radially outward from the spiral axis.
    pub rotation: Euler,
    pub overall_index: usize,
    pub is_checkpoint: bool,
    /// Index of the task this step belongs to, if it is a checkpoint.
    pub checkpoint_index: Option<usize>,
}

/// A generated staircase together with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staircase {
    pub seed: String,
    pub task_count: usize,
    pub steps: Vec<Step>,
}

impl Staircase {
    pub fn checkpoints(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_checkpoint)
    }

    pub fn climber_index(&self, done_count: usize) -> usize {
        climber_step(&self.steps, done_count)
    }

    /// Index of the next checkpoint to reach, or `None` at the summit.
    pub fn next_checkpoint(&self, done_count: usize) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.checkpoint_index == Some(done_count))
            .map(|s| s.overall_index)
    }
}

/// Seed-derived shape parameters.
#[derive(Debug, Clone, Copy)]
struct Wobble {
    amplitude: f64,
    phase: f64,
}

impl Wobble {
    fn from_seed(seed: &str) -> Self {
        Self {
            amplitude: WOBBLE_MIN + WOBBLE_SPAN * hash_seed_to_unit_float(seed, "radius"),
            phase: TAU * hash_seed_to_unit_float(seed, "phase"),
        }
    }

    fn factor(&self, angle: f64) -> f64 {
        1.0 + self.amplitude * (WOBBLE_LOBES * angle + self.phase).sin()
    }
}

/// Cone radius at height `y`: full radius at the base, zero at the apex.
fn cone_radius(y: f64) -> f64 {
    let t = (y - START_Y) / (APEX_Y - START_Y);
    BASE_RADIUS * (1.0 - t)
}

/// Number of intervals used for `task_count` tasks.
///
/// Checkpoint `k` lands on `floor((k+1) * intervals / n)`; with at least as
/// many intervals as tasks those indices are strictly increasing, so two
/// tasks never share a step.
pub fn interval_count(task_count: usize) -> usize {
    BASE_INTERVALS.max(task_count)
}

/// Build the spiral staircase for a mountain.
pub fn generate_staircase(task_count: usize, seed: &str) -> Staircase {
    let intervals = interval_count(task_count);
    let wobble = Wobble::from_seed(seed);
    let total_angle = TAU * f64::from(TOTAL_ROTATIONS);

    let mut steps: Vec<Step> = (0..=intervals)
        .map(|i| {
            let t = i as f64 / intervals as f64;
            let angle = t * total_angle;
            let y = START_Y + t * (END_Y - START_Y);
            let radius = cone_radius(y) * wobble.factor(angle) + SURFACE_OFFSET;
            Step {
                position: Vec3 {
                    x: angle.cos() * radius,
                    y,
                    z: angle.sin() * radius,
                },
                rotation: Euler {
                    x: 0.0,
                    y: -angle,
                    z: 0.0,
                },
                overall_index: i,
                is_checkpoint: false,
                checkpoint_index: None,
            }
        })
        .collect();

    if task_count == 0 {
        // The summit alone stands for the goal.
        if let Some(last) = steps.last_mut() {
            last.is_checkpoint = true;
            last.checkpoint_index = Some(0);
        }
    } else {
        for k in 0..task_count {
            let index = (k + 1) * intervals / task_count;
            let step = &mut steps[index];
            step.is_checkpoint = true;
            step.checkpoint_index = Some(k);
        }
    }

    Staircase {
        seed: seed.to_string(),
        task_count,
        steps,
    }
}

/// Index of the step the climber stands on after `done_count` tasks.
///
/// Nothing done puts the climber at the base. Otherwise it stands on the
/// checkpoint of the last reached task, or the top step if that checkpoint
/// does not exist.
pub fn climber_step(steps: &[Step], done_count: usize) -> usize {
    if done_count == 0 {
        return 0;
    }
    steps
        .iter()
        .find(|s| s.checkpoint_index == Some(done_count - 1))
        .map(|s| s.overall_index)
        .unwrap_or_else(|| steps.len().saturating_sub(1))
}
