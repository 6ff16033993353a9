//! PBT Core - Shared types for adversarial population training
//!
//! This crate provides the vocabulary the other crates speak:
//! - Policy identifiers and flat weight vectors
//! - Per-episode metrics and their summaries
//! - The `Trainer` and `RolloutWorker` seams behind which the RL stack lives
//! - The error type shared by all library crates

pub mod error;
pub mod policy;
pub mod episode;
pub mod trainer;

// Re-exports for convenient access
pub use error::{PbtError, Result};
pub use policy::{Opponent, PolicyId, PolicyWeights, WeightMap, EVAL_OPPONENT, MAIN_POLICY};
pub use episode::{summarize_episodes, EpisodeMetrics, EpisodeSummary, Stat};
pub use trainer::{all_weights, RolloutWorker, TrainResult, Trainer};
