//! Evaluation worker playing `main` against `eval_op`
//!
//! Level 3 - Steps

use std::collections::BTreeMap;

use pbt_core::{
    EpisodeMetrics, PbtError, PolicyId, PolicyWeights, Result, RolloutWorker, WeightMap, EVAL_OPPONENT,
    MAIN_POLICY,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::env::DuelEnv;

/// Rollout worker over a duel environment
///
/// `main` always plays the row side and `eval_op` the column side.
/// Rewards are reported unshaped.
pub struct SimWorker {
    env: DuelEnv,
    weights: WeightMap,
    rng: ChaCha8Rng,
    finished: Vec<EpisodeMetrics>,
}

impl SimWorker {
    pub fn new(env: DuelEnv, seed: u64) -> Self {
        Self {
            env,
            weights: WeightMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            finished: Vec::new(),
        }
    }

    /// Pool of `count` workers with consecutive seeds
    pub fn pool(env: &DuelEnv, count: usize, seed: u64) -> Vec<Self> {
        (0..count)
            .map(|i| Self::new(env.clone(), seed.wrapping_add(i as u64)))
            .collect()
    }

    fn policy(&self, name: &str) -> Result<&PolicyWeights> {
        self.weights
            .get(name)
            .ok_or_else(|| PbtError::UnknownPolicy(format!("{} not installed on worker", name)))
    }
}

impl RolloutWorker for SimWorker {
    fn set_weights(&mut self, weights: WeightMap) -> Result<()> {
        self.weights.extend(weights);
        Ok(())
    }

    fn sample(&mut self) -> Result<()> {
        let main = self.policy(MAIN_POLICY)?.clone();
        let opponent = self.policy(EVAL_OPPONENT)?.clone();

        let episode = self.env.play(&main, &opponent, &mut self.rng)?;
        let returns = episode.returns(None)?;

        let mut policy_rewards = BTreeMap::new();
        policy_rewards.insert(PolicyId::main(), returns.returns[0]);
        policy_rewards.insert(PolicyId::eval_opponent(), returns.returns[1]);

        let mut custom_metrics = BTreeMap::new();
        let win = if episode.row_payoff() > 0.0 { 1.0 } else { 0.0 };
        custom_metrics.insert("main_win".to_string(), win);

        self.finished.push(EpisodeMetrics {
            reward: returns.returns.iter().sum(),
            length: episode.len() as u32,
            policy_rewards,
            custom_metrics,
        });
        Ok(())
    }

    fn collect_episodes(&mut self) -> Vec<EpisodeMetrics> {
        std::mem::take(&mut self.finished)
    }
}
