//! Summit: goal tracking as a mountain climb.
//!
//! A user sets a summit (goal), breaks it into ledges (tasks) and checks
//! them off. This crate owns everything below the rendering layer:
//!
//! - [`progress`]: completion percentage, altitude and motivation.
//! - [`geometry`]: the seed-stable spiral staircase and the 2D side view.
//! - [`migration`]: loading documents from every schema generation.
//! - [`store`]: the in-memory state that user operations act on.
//! - [`sync`] and [`sessions`]: debounced write-back per user.
//! - [`generate`]: AI-assisted task generation and merging.
//! - [`db`] and [`api`]: the SQLite document store and its HTTP API.

pub mod api;
pub mod config;
pub mod db;
pub mod generate;
pub mod geometry;
pub mod migration;
pub mod models;
pub mod progress;
pub mod sessions;
pub mod store;
pub mod sync;
