//! Episode metrics and summaries
//!
//! Workers report one `EpisodeMetrics` per finished episode. Summaries fold
//! any number of them into mean/min/max statistics, overall and per policy.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::policy::PolicyId;

/// Metrics of a single finished episode
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    /// Sum of rewards over all agents
    pub reward: f64,
    /// Number of environment steps
    pub length: u32,
    /// Total reward collected by each policy
    pub policy_rewards: BTreeMap<PolicyId, f64>,
    /// Free-form scalars reported by the environment
    pub custom_metrics: BTreeMap<String, f64>,
}

/// Mean, min and max of a series
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Stat {
    /// Statistics of a series, `None` when it is empty
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        Some(Self {
            mean: sum / values.len() as f64,
            min,
            max,
        })
    }
}

/// Summary of a batch of episodes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episodes_this_iter: usize,
    pub episode_reward: Option<Stat>,
    pub episode_len_mean: Option<f64>,
    pub policy_reward_mean: BTreeMap<PolicyId, f64>,
    pub policy_reward_min: BTreeMap<PolicyId, f64>,
    pub policy_reward_max: BTreeMap<PolicyId, f64>,
    pub custom_metrics: BTreeMap<String, Stat>,
}

impl EpisodeSummary {
    /// Mean reward of a policy, if it took part in any episode
    pub fn policy_mean(&self, policy: &str) -> Option<f64> {
        self.policy_reward_mean.get(policy).copied()
    }

    /// Flatten into `name -> value` pairs for metric sinks
    pub fn to_flat(&self) -> BTreeMap<String, f64> {
        let mut flat = BTreeMap::new();
        flat.insert("episodes_this_iter".to_string(), self.episodes_this_iter as f64);
        if let Some(stat) = self.episode_reward {
            flat.insert("episode_reward_mean".to_string(), stat.mean);
            flat.insert("episode_reward_min".to_string(), stat.min);
            flat.insert("episode_reward_max".to_string(), stat.max);
        }
        if let Some(len) = self.episode_len_mean {
            flat.insert("episode_len_mean".to_string(), len);
        }
        for (policy, value) in &self.policy_reward_mean {
            flat.insert(format!("policy_reward_mean/{}", policy), *value);
        }
        for (name, stat) in &self.custom_metrics {
            flat.insert(format!("custom_metrics/{}_mean", name), stat.mean);
            flat.insert(format!("custom_metrics/{}_min", name), stat.min);
            flat.insert(format!("custom_metrics/{}_max", name), stat.max);
        }
        flat
    }
}

/// Summarize a batch of episodes
pub fn summarize_episodes(episodes: &[EpisodeMetrics]) -> EpisodeSummary {
    if episodes.is_empty() {
        return EpisodeSummary::default();
    }

    let rewards: Vec<f64> = episodes.iter().map(|e| e.reward).collect();
    let total_len: u64 = episodes.iter().map(|e| e.length as u64).sum();

    let mut per_policy: FxHashMap<&PolicyId, Vec<f64>> = FxHashMap::default();
    let mut per_metric: FxHashMap<&str, Vec<f64>> = FxHashMap::default();
    for episode in episodes {
        for (policy, reward) in &episode.policy_rewards {
            per_policy.entry(policy).or_default().push(*reward);
        }
        for (name, value) in &episode.custom_metrics {
            per_metric.entry(name.as_str()).or_default().push(*value);
        }
    }

    let mut summary = EpisodeSummary {
        episodes_this_iter: episodes.len(),
        episode_reward: Stat::of(&rewards),
        episode_len_mean: Some(total_len as f64 / episodes.len() as f64),
        ..Default::default()
    };

    for (policy, values) in per_policy {
        if let Some(stat) = Stat::of(&values) {
            summary.policy_reward_mean.insert(policy.clone(), stat.mean);
            summary.policy_reward_min.insert(policy.clone(), stat.min);
            summary.policy_reward_max.insert(policy.clone(), stat.max);
        }
    }
    for (name, values) in per_metric {
        if let Some(stat) = Stat::of(&values) {
            summary.custom_metrics.insert(name.to_string(), stat);
        }
    }

    summary
}
