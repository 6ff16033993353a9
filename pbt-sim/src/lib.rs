//! PBT Sim - In-process reference trainer and workers
//!
//! This crate provides a small, fully in-process stand-in for an RL stack:
//! - Zero-sum matrix games and a repeated-move duel environment
//! - Softmax policies over flat logit vectors
//! - `SimWorker`, an evaluation worker playing `main` against `eval_op`
//! - `SimTrainer`, a REINFORCE trainer with opponent scheduling, reward
//!   shaping and periodic PBT evaluation
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: SimTrainer::train (orchestration)
//! - Level 2: batch collection, policy updates, evaluation (phases)
//! - Level 3: DuelEnv::play, SimWorker::sample (steps)
//! - Level 4: games, configuration

mod game;
mod policy;
mod env;
mod worker;
mod trainer;

pub use game::MatrixGame;
pub use policy::{action_probs, sample_action, PolicyGradient};
pub use env::{DuelEnv, DuelEpisode, DuelReturns, DuelStep, REWARD_MOVE, REWARD_REMAINING};
pub use worker::SimWorker;
pub use trainer::{Matchup, SimTrainer, SimTrainerConfig};
