//! Seams to the RL training stack
//!
//! Everything behind these traits (optimisation, environments, rollout
//! transport) is opaque to the scheduling and evaluation code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::episode::EpisodeMetrics;
use crate::error::Result;
use crate::policy::{PolicyId, PolicyWeights, WeightMap};

/// A sampling worker holding a copy of some policies
pub trait RolloutWorker: Send {
    /// Replace the weights of the given policies
    fn set_weights(&mut self, weights: WeightMap) -> Result<()>;

    /// Run exactly one episode, buffering its metrics
    fn sample(&mut self) -> Result<()>;

    /// Drain the metrics of all episodes finished since the last call
    fn collect_episodes(&mut self) -> Vec<EpisodeMetrics>;
}

/// Outcome of one training iteration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainResult {
    /// Training iterations run so far, this one included
    pub training_iteration: usize,
    /// Environment steps sampled since training started
    pub timesteps_total: u64,
    /// Environment steps per policy since training started
    pub policy_timesteps: BTreeMap<PolicyId, u64>,
    /// Episodes finished since training started
    pub episodes_total: u64,
    /// Mean episode reward over this iteration
    pub episode_reward_mean: Option<f64>,
    /// Mean episode reward per policy over this iteration
    pub policy_reward_mean: BTreeMap<PolicyId, f64>,
    /// Mean of custom metrics over this iteration
    pub custom_metrics: BTreeMap<String, f64>,
    /// Evaluation line plot, empty when no evaluation ran this iteration
    pub eval_line_plot: BTreeMap<String, f64>,
}

impl TrainResult {
    /// Look up a metric by name
    ///
    /// Accepts `episode_reward_mean`, `policy_reward_mean/<policy>` and the
    /// names of custom metrics.
    pub fn metric(&self, name: &str) -> Option<f64> {
        if name == "episode_reward_mean" {
            return self.episode_reward_mean;
        }
        if let Some(policy) = name.strip_prefix("policy_reward_mean/") {
            return self.policy_reward_mean.get(policy).copied();
        }
        self.custom_metrics.get(name).copied()
    }

    /// Steps sampled by one policy, 0 when it never played
    pub fn timesteps_of(&self, policy: &str) -> u64 {
        self.policy_timesteps.get(policy).copied().unwrap_or(0)
    }
}

/// An RL trainer over a set of named policies
pub trait Trainer {
    /// Run one training iteration
    fn train(&mut self) -> Result<TrainResult>;

    /// Current weights of a policy
    fn get_weights(&self, policy: &PolicyId) -> Option<PolicyWeights>;

    /// Overwrite the weights of some policies and sync them to the workers
    fn set_weights(&mut self, weights: WeightMap) -> Result<()>;

    /// Episodes each evaluation worker runs per opponent
    fn evaluation_duration(&self) -> usize;

    /// Ids of all policies the trainer holds
    fn policy_ids(&self) -> Vec<PolicyId>;
}

/// Snapshot the weights of every policy a trainer holds
pub fn all_weights<T: Trainer + ?Sized>(trainer: &T) -> WeightMap {
    trainer
        .policy_ids()
        .into_iter()
        .filter_map(|id| trainer.get_weights(&id).map(|w| (id, w)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_lookup() {
        let mut result = TrainResult {
            episode_reward_mean: Some(1.5),
            ..Default::default()
        };
        result.policy_reward_mean.insert(PolicyId::main(), 0.75);
        result.custom_metrics.insert("dense_weight".to_string(), 0.4);

        assert_eq!(result.metric("episode_reward_mean"), Some(1.5));
        assert_eq!(result.metric("policy_reward_mean/main"), Some(0.75));
        assert_eq!(result.metric("dense_weight"), Some(0.4));
        assert_eq!(result.metric("policy_reward_mean/op_0"), None);
    }

    #[test]
    fn test_timesteps_of_missing_policy() {
        let mut result = TrainResult::default();
        result.policy_timesteps.insert(PolicyId::main(), 40);
        assert_eq!(result.timesteps_of("main"), 40);
        assert_eq!(result.timesteps_of("op_1"), 0);
    }
}
