//! PBT Schedule - Opponent sampling and reward annealing
//!
//! This crate provides the decisions made between training steps:
//! - Opponent selection (uniform, among active agents, from a policy list)
//! - Policy mapping for multi-agent episodes
//! - Annealers mapping training progress to a blend weight
//! - A shared registry of named annealers
//! - Sparse/dense reward shaping driven by an annealer

pub mod opponent;
pub mod mapping;
pub mod anneal;
pub mod scheduler;
pub mod shaping;

pub use opponent::{
    random_choice_scheduler, random_policy_scheduler, random_scheduler, AgentInfos,
    OpponentScheduler, ScheduledOpponent,
};
pub use mapping::PolicyMapping;
pub use anneal::{Annealer, Comparison, ConditionalAnnealer, ConditionalConfig};
pub use scheduler::{AnnealScheduler, AnnealerHandle, REWARD_SHAPING};
pub use shaping::{apply_reward_shaping, RewardShaper, RewardShapingConfig, ShapedReward, ShapingWeights};
