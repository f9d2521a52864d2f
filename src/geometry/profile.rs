//! Flat side-view layout for the 2D (SVG) scene.
//!
//! Coordinates live in an 800x500 view box with y growing downward. The left
//! flank rises along an ease-out curve from the base to the summit; ledges
//! and the climber are placed on that flank.

use serde::{Deserialize, Serialize};

pub const VIEW_WIDTH: f64 = 800.0;
pub const VIEW_HEIGHT: f64 = 500.0;
pub const BASE_Y: f64 = 480.0;
pub const SUMMIT_X: f64 = 400.0;
pub const SUMMIT_Y: f64 = 80.0;
pub const LEFT_BASE_X: f64 = 120.0;
pub const RIGHT_BASE_X: f64 = VIEW_WIDTH - 120.0;

const OUTLINE_SAMPLES: u32 = 40;
const CAP_WIDTH: f64 = 72.0;
const CAP_HEIGHT: f64 = 48.0;
const CLIMBER_LIFT: f64 = 12.0;
const CLIMBER_BASE_INSET: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

/// A ledge drawn on the left flank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ledge {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub reached: bool,
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Point on the left flank at `t` in `[0, 1]`, base to summit.
fn left_flank(t: f64) -> Point2 {
    Point2 {
        x: lerp(LEFT_BASE_X, SUMMIT_X, t),
        y: lerp(BASE_Y, SUMMIT_Y, 1.0 - (1.0 - t) * (1.0 - t)),
    }
}

/// Closed SVG path for the mountain silhouette.
pub fn mountain_outline() -> String {
    let mut parts = Vec::with_capacity(2 * OUTLINE_SAMPLES as usize + 2);
    for i in 0..=OUTLINE_SAMPLES {
        let p = left_flank(f64::from(i) / f64::from(OUTLINE_SAMPLES));
        let cmd = if i == 0 { 'M' } else { 'L' };
        parts.push(format!("{} {} {}", cmd, p.x, p.y));
    }
    for i in 1..=OUTLINE_SAMPLES {
        let t = f64::from(i) / f64::from(OUTLINE_SAMPLES);
        let x = lerp(SUMMIT_X, RIGHT_BASE_X, t);
        let y = lerp(SUMMIT_Y, BASE_Y, t * t);
        parts.push(format!("L {} {}", x, y));
    }
    parts.push("Z".to_string());
    parts.join(" ")
}

/// Triangle path for the snow cap.
pub fn summit_cap() -> String {
    format!(
        "M {} {} L {} {} L {} {} Z",
        SUMMIT_X - CAP_WIDTH / 2.0,
        SUMMIT_Y + CAP_HEIGHT,
        SUMMIT_X,
        SUMMIT_Y,
        SUMMIT_X + CAP_WIDTH / 2.0,
        SUMMIT_Y + CAP_HEIGHT
    )
}

/// Evenly spaced ledges, narrowing toward the summit.
pub fn ledge_positions(ledge_count: usize, done_count: usize) -> Vec<Ledge> {
    (0..ledge_count)
        .map(|i| {
            let t = (i as f64 + 0.5) / ledge_count as f64;
            let p = left_flank(t);
            Ledge {
                x: p.x,
                y: p.y,
                width: 44.0 + (1.0 - t) * 36.0,
                reached: i < done_count,
            }
        })
        .collect()
}

/// Climber position just above the last reached ledge.
pub fn climber_position(total_tasks: usize, done_count: usize) -> Point2 {
    let base = Point2 {
        x: LEFT_BASE_X + CLIMBER_BASE_INSET,
        y: BASE_Y - CLIMBER_BASE_INSET,
    };
    if total_tasks == 0 {
        return base;
    }
    let reached = done_count.min(total_tasks) as f64;
    let t = (reached - 0.25) / total_tasks as f64;
    if t <= 0.0 {
        return base;
    }
    let p = left_flank(t);
    Point2 {
        x: p.x,
        y: p.y - CLIMBER_LIFT,
    }
}
