//! Reference trainer - REINFORCE over matrix game duels
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: train() - orchestration
//! - Level 2: collect_batch(), apply_updates(), summarize(), evaluate()
//! - Level 3: play_episode(), accumulate_gradient()
//! - Level 4: configuration, weight initialisation

use std::collections::{BTreeMap, BTreeSet};

use pbt_core::{
    summarize_episodes, EpisodeMetrics, Opponent, PbtError, PolicyId, PolicyWeights, Result,
    RolloutWorker, TrainResult, Trainer, WeightMap,
};
use pbt_eval::{EvalConfig, EvalReport, OpponentPool, PbtEvaluator};
use pbt_schedule::{AgentInfos, OpponentScheduler, RewardShaper};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::env::{DuelEnv, DuelEpisode, DuelReturns};
use crate::game::MatrixGame;
use crate::policy::PolicyGradient;
use crate::worker::SimWorker;

// ============================================================================
// CONFIGURATION (Level 4)
// ============================================================================

/// Settings of the reference trainer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimTrainerConfig {
    /// Matrix game preset
    pub game: String,
    /// Moves per episode
    pub horizon: u32,
    /// Environment steps collected per training iteration
    pub train_batch_size: u64,
    pub lr: f64,
    /// Decay of the running reward baseline
    pub baseline_decay: f64,
    /// How the column-side opponent is picked each episode
    pub scheduler: OpponentScheduler,
    pub eval: EvalConfig,
    pub seed: u64,
}

impl Default for SimTrainerConfig {
    fn default() -> Self {
        Self {
            game: "rock_paper_scissors".to_string(),
            horizon: 10,
            train_batch_size: 400,
            lr: 0.1,
            baseline_decay: 0.9,
            scheduler: OpponentScheduler::default(),
            eval: EvalConfig::default(),
            seed: 0,
        }
    }
}

/// Who plays whom
#[derive(Clone, Debug)]
pub struct Matchup {
    /// Policy on the row side of every episode, evaluated as `main`
    pub learner: PolicyId,
    /// Candidates for the column side
    pub opponents: AgentInfos,
    /// Policies updated by `train`
    pub trainable: BTreeSet<PolicyId>,
}

impl Matchup {
    /// Learner against a population of `op_<i>`, everyone trainable
    pub fn population(learner: PolicyId, num_opponents: usize) -> Self {
        let opponents = AgentInfos::population(num_opponents);
        let mut trainable: BTreeSet<PolicyId> = opponents.opponent_policies.iter().cloned().collect();
        trainable.insert(learner.clone());
        Self {
            learner,
            opponents,
            trainable,
        }
    }

    /// Learner against a fixed list of opponents, only the listed policies train
    pub fn fixed(learner: PolicyId, opponents: Vec<PolicyId>, trainable: &[PolicyId]) -> Self {
        Self {
            learner,
            opponents: AgentInfos {
                num_agents: opponents.len(),
                deactivated: vec![false; opponents.len()],
                opponent_policies: opponents,
            },
            trainable: trainable.iter().cloned().collect(),
        }
    }

    /// Every policy taking part in training
    pub fn policies(&self) -> BTreeSet<PolicyId> {
        let mut all: BTreeSet<PolicyId> = self.opponents.opponent_policies.iter().cloned().collect();
        all.insert(self.learner.clone());
        all
    }
}

/// One played training episode
struct PlayedEpisode {
    sides: [PolicyId; 2],
    episode: DuelEpisode,
    returns: DuelReturns,
}

// ============================================================================
// TRAINER
// ============================================================================

/// In-process trainer over a duel environment
pub struct SimTrainer {
    config: SimTrainerConfig,
    env: DuelEnv,
    matchup: Matchup,
    policies: WeightMap,
    baselines: FxHashMap<PolicyId, f64>,
    shaper: Option<RewardShaper>,
    evaluator: Option<PbtEvaluator>,
    /// Pool key refreshed with the current opponents before each evaluation
    current_pool_key: Option<String>,
    eval_workers: Vec<SimWorker>,
    rng: ChaCha8Rng,
    iteration: usize,
    timesteps_total: u64,
    policy_timesteps: BTreeMap<PolicyId, u64>,
    episodes_total: u64,
}

impl SimTrainer {
    pub fn new(config: SimTrainerConfig, matchup: Matchup) -> Result<Self> {
        let env = DuelEnv::new(MatrixGame::preset(&config.game)?, config.horizon)?;
        if config.train_batch_size == 0 {
            return Err(PbtError::InvalidConfig("train_batch_size must be positive".to_string()));
        }
        let known = matchup.policies();
        if let Some(unknown) = matchup.trainable.iter().find(|p| !known.contains(*p)) {
            return Err(PbtError::UnknownPolicy(unknown.to_string()));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let num_actions = env.game().num_actions();
        let policies = known
            .into_iter()
            .map(|id| (id, init_weights(num_actions, &mut rng)))
            .collect();

        tracing::info!(
            "Trainer ready: game={}, learner={}, {} opponents, {} trainable",
            config.game,
            matchup.learner,
            matchup.opponents.opponent_policies.len(),
            matchup.trainable.len()
        );

        Ok(Self {
            config,
            env,
            matchup,
            policies,
            baselines: FxHashMap::default(),
            shaper: None,
            evaluator: None,
            current_pool_key: None,
            eval_workers: Vec::new(),
            rng,
            iteration: 0,
            timesteps_total: 0,
            policy_timesteps: BTreeMap::new(),
            episodes_total: 0,
        })
    }

    /// Shape training rewards with the given shaper
    pub fn with_reward_shaping(mut self, shaper: RewardShaper) -> Self {
        self.shaper = Some(shaper);
        self
    }

    /// Evaluate against opponent pools every `evaluation_interval` iterations
    ///
    /// When `current_pool_key` is set, that pool is refreshed with the
    /// trainer's current opponents before each evaluation.
    pub fn with_evaluation(mut self, current_pool_key: Option<&str>) -> Self {
        let eval = self.config.eval.clone();
        self.eval_workers = SimWorker::pool(
            &self.env,
            eval.evaluation_num_workers,
            self.config.seed.wrapping_add(1_000),
        );
        self.evaluator = Some(PbtEvaluator::new(eval));
        self.current_pool_key = current_pool_key.map(str::to_string);
        self
    }

    pub fn evaluator_mut(&mut self) -> Option<&mut PbtEvaluator> {
        self.evaluator.as_mut()
    }

    /// Environment steps collected so far
    pub fn timesteps_total(&self) -> u64 {
        self.timesteps_total
    }

    pub fn matchup(&self) -> &Matchup {
        &self.matchup
    }

    pub fn matchup_mut(&mut self) -> &mut Matchup {
        &mut self.matchup
    }

    /// Current weights of every opponent candidate
    pub fn opponents_snapshot(&self) -> Vec<Opponent> {
        self.matchup
            .opponents
            .opponent_policies
            .iter()
            .filter_map(|id| self.policies.get(id).map(|w| Opponent::new(id.clone(), w.clone())))
            .collect()
    }

    // ========================================================================
    // LEVEL 2 - PHASES
    // ========================================================================

    /// Play episodes until the batch holds `train_batch_size` steps
    fn collect_batch(&mut self) -> Result<Vec<PlayedEpisode>> {
        let mut batch = Vec::new();
        let mut steps = 0u64;
        while steps < self.config.train_batch_size {
            let played = self.play_episode()?;
            let len = played.episode.len() as u64;
            steps += len;
            for side in &played.sides {
                *self.policy_timesteps.entry(side.clone()).or_insert(0) += len;
            }
            batch.push(played);
        }
        self.timesteps_total += steps;
        self.episodes_total += batch.len() as u64;
        Ok(batch)
    }

    /// REINFORCE step with a running baseline for every trainable policy
    fn apply_updates(&mut self, batch: &[PlayedEpisode]) {
        let num_actions = self.env.game().num_actions();
        let mut grads: BTreeMap<PolicyId, PolicyGradient> = BTreeMap::new();
        let mut returns: FxHashMap<PolicyId, Vec<f64>> = FxHashMap::default();

        for played in batch {
            for (side, policy) in played.sides.iter().enumerate() {
                if !self.matchup.trainable.contains(policy) {
                    continue;
                }
                let ret = played.returns.returns[side];
                let baseline = self.baselines.get(policy).copied().unwrap_or(0.0);
                let grad = grads
                    .entry(policy.clone())
                    .or_insert_with(|| PolicyGradient::new(num_actions));
                accumulate_gradient(grad, &played.episode, side, ret - baseline);
                returns.entry(policy.clone()).or_default().push(ret);
            }
        }

        for (policy, grad) in &grads {
            if let Some(weights) = self.policies.get_mut(policy) {
                grad.apply(weights, self.config.lr);
            }
        }

        let decay = self.config.baseline_decay;
        for (policy, values) in returns {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let baseline = self.baselines.entry(policy).or_insert(mean);
            *baseline = decay * *baseline + (1.0 - decay) * mean;
        }
    }

    /// Fold the batch into a train result
    fn summarize(&self, batch: &[PlayedEpisode]) -> TrainResult {
        let episodes: Vec<EpisodeMetrics> = batch.iter().map(episode_metrics).collect();
        let summary = summarize_episodes(&episodes);

        TrainResult {
            training_iteration: self.iteration,
            timesteps_total: self.timesteps_total,
            policy_timesteps: self.policy_timesteps.clone(),
            episodes_total: self.episodes_total,
            episode_reward_mean: summary.episode_reward.map(|s| s.mean),
            policy_reward_mean: summary.policy_reward_mean,
            custom_metrics: summary
                .custom_metrics
                .into_iter()
                .map(|(k, s)| (k, s.mean))
                .collect(),
            eval_line_plot: BTreeMap::new(),
        }
    }

    /// Run the PBT evaluator with the learner installed as `main`
    pub fn evaluate(&mut self) -> Result<EvalReport> {
        let snapshot = self.opponents_snapshot();
        tracing::debug!(
            "Evaluating {} with {} episodes per opponent",
            self.matchup.learner,
            self.evaluation_duration()
        );
        let learner = self
            .policies
            .get(&self.matchup.learner)
            .cloned()
            .ok_or_else(|| PbtError::UnknownPolicy(self.matchup.learner.to_string()))?;

        let evaluator = match self.evaluator.as_mut() {
            Some(evaluator) => evaluator,
            None => return Ok(EvalReport::default()),
        };
        if let Some(key) = &self.current_pool_key {
            evaluator.set_pool(key.clone(), OpponentPool::Current(snapshot));
        }

        for worker in &mut self.eval_workers {
            let mut weights = WeightMap::new();
            weights.insert(PolicyId::main(), learner.clone());
            worker.set_weights(weights)?;
        }

        evaluator.evaluate(&mut self.eval_workers)
    }

    // ========================================================================
    // LEVEL 3 - STEPS
    // ========================================================================

    /// Pick an opponent and play one episode
    fn play_episode(&mut self) -> Result<PlayedEpisode> {
        let opponent = self
            .config
            .scheduler
            .select_policy(&self.matchup.opponents, &mut self.rng)?;
        let learner = self.matchup.learner.clone();

        let row = lookup(&self.policies, &learner)?;
        let col = lookup(&self.policies, &opponent)?;
        let episode = self.env.play(row, col, &mut self.rng)?;
        let returns = episode.returns(self.shaper.as_ref())?;

        Ok(PlayedEpisode {
            sides: [learner, opponent],
            episode,
            returns,
        })
    }

}

impl Trainer for SimTrainer {
    /// One training iteration (Level 1 orchestration)
    fn train(&mut self) -> Result<TrainResult> {
        self.iteration += 1;

        let batch = self.collect_batch()?;
        self.apply_updates(&batch);
        let mut result = self.summarize(&batch);

        if self.evaluator.is_some() && self.config.eval.is_due(self.iteration) {
            let report = self.evaluate()?;
            result.eval_line_plot = report.line_plot;
        }

        tracing::debug!(
            "Iteration {}: {} episodes, timesteps_total={}",
            self.iteration,
            batch.len(),
            self.timesteps_total
        );
        Ok(result)
    }

    fn get_weights(&self, policy: &PolicyId) -> Option<PolicyWeights> {
        self.policies.get(policy).cloned()
    }

    fn set_weights(&mut self, weights: WeightMap) -> Result<()> {
        let num_actions = self.env.game().num_actions();
        for (policy, w) in weights {
            if w.len() < num_actions {
                return Err(PbtError::InvalidConfig(format!(
                    "weights for {} have {} values, need {}",
                    policy,
                    w.len(),
                    num_actions
                )));
            }
            match self.policies.get_mut(&policy) {
                Some(slot) => *slot = w,
                None => return Err(PbtError::UnknownPolicy(policy.to_string())),
            }
        }
        Ok(())
    }

    fn evaluation_duration(&self) -> usize {
        self.config.eval.evaluation_duration
    }

    fn policy_ids(&self) -> Vec<PolicyId> {
        self.policies.keys().cloned().collect()
    }
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn lookup<'a>(policies: &'a WeightMap, policy: &PolicyId) -> Result<&'a PolicyWeights> {
    policies
        .get(policy)
        .ok_or_else(|| PbtError::UnknownPolicy(policy.to_string()))
}

/// Small random logits so population members start apart
fn init_weights(num_actions: usize, rng: &mut ChaCha8Rng) -> PolicyWeights {
    PolicyWeights::new((0..num_actions).map(|_| rng.gen_range(-0.1..0.1)).collect())
}

fn accumulate_gradient(grad: &mut PolicyGradient, episode: &DuelEpisode, side: usize, advantage: f64) {
    for step in &episode.steps {
        grad.add(&step.probs[side], step.actions[side], advantage);
    }
}

/// Metrics of a training episode; a policy on both sides reports its row return
fn episode_metrics(played: &PlayedEpisode) -> EpisodeMetrics {
    let mut policy_rewards = BTreeMap::new();
    for (side, policy) in played.sides.iter().enumerate() {
        policy_rewards
            .entry(policy.clone())
            .or_insert(played.returns.returns[side]);
    }

    let mut custom_metrics = BTreeMap::new();
    if let Some(c) = played.returns.dense_weight {
        custom_metrics.insert("dense_weight".to_string(), c);
    }

    EpisodeMetrics {
        reward: played.returns.returns.iter().sum(),
        length: played.episode.len() as u32,
        policy_rewards,
        custom_metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbt_schedule::{apply_reward_shaping, AnnealScheduler, RewardShapingConfig, REWARD_SHAPING};

    fn config() -> SimTrainerConfig {
        SimTrainerConfig {
            horizon: 5,
            train_batch_size: 50,
            eval: EvalConfig::new(2).with_workers(2),
            seed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn test_train_counts_timesteps() {
        let matchup = Matchup::population(PolicyId::main(), 3);
        let mut trainer = SimTrainer::new(config(), matchup).unwrap();

        let first = trainer.train().unwrap();
        assert_eq!(first.training_iteration, 1);
        assert_eq!(first.timesteps_total, 50);
        assert_eq!(first.episodes_total, 10);
        assert_eq!(first.timesteps_of("main"), 50);
        assert!(first.eval_line_plot.is_empty());

        let second = trainer.train().unwrap();
        assert_eq!(second.timesteps_total, 100);
        assert!(second.policy_reward_mean.contains_key("main"));
    }

    #[test]
    fn test_fixed_opponent_does_not_change() {
        let victim = PolicyId::new("victim");
        let matchup = Matchup::fixed(PolicyId::main(), vec![victim.clone()], &[PolicyId::main()]);
        let mut trainer = SimTrainer::new(config(), matchup).unwrap();

        let before_victim = trainer.get_weights(&victim).unwrap();
        let before_main = trainer.get_weights(&PolicyId::main()).unwrap();
        for _ in 0..3 {
            trainer.train().unwrap();
        }

        assert_eq!(trainer.get_weights(&victim).unwrap(), before_victim);
        assert_ne!(trainer.get_weights(&PolicyId::main()).unwrap(), before_main);
    }

    #[test]
    fn test_learns_to_exploit_fixed_opponent() {
        // Opponent nearly always plays rock; paper (action 1) should win out
        let victim = PolicyId::new("victim");
        let matchup = Matchup::fixed(PolicyId::main(), vec![victim.clone()], &[PolicyId::main()]);
        let mut cfg = config();
        cfg.train_batch_size = 200;
        cfg.lr = 0.5;
        let mut trainer = SimTrainer::new(cfg, matchup).unwrap();

        let mut weights = WeightMap::new();
        weights.insert(victim, PolicyWeights::new(vec![10.0, -10.0, -10.0]));
        trainer.set_weights(weights).unwrap();

        for _ in 0..50 {
            trainer.train().unwrap();
        }

        let main = trainer.get_weights(&PolicyId::main()).unwrap();
        let probs = crate::policy::action_probs(&main, 3).unwrap();
        assert!(probs[1] > 0.6, "paper probability {:.3}", probs[1]);
    }

    #[test]
    fn test_set_weights_validation() {
        let matchup = Matchup::population(PolicyId::main(), 1);
        let mut trainer = SimTrainer::new(config(), matchup).unwrap();

        let mut unknown = WeightMap::new();
        unknown.insert(PolicyId::new("ghost"), PolicyWeights::zeros(3));
        assert!(matches!(trainer.set_weights(unknown), Err(PbtError::UnknownPolicy(_))));

        let mut short = WeightMap::new();
        short.insert(PolicyId::main(), PolicyWeights::zeros(1));
        assert!(trainer.set_weights(short).is_err());
    }

    #[test]
    fn test_unknown_trainable_rejected() {
        let matchup = Matchup::fixed(PolicyId::main(), vec![PolicyId::new("a")], &[PolicyId::new("b")]);
        assert!(SimTrainer::new(config(), matchup).is_err());
    }

    #[test]
    fn test_evaluation_fills_line_plot() {
        let matchup = Matchup::population(PolicyId::main(), 3);
        let mut trainer = SimTrainer::new(config(), matchup)
            .unwrap()
            .with_evaluation(Some("current"));

        let result = trainer.train().unwrap();
        assert!(result.eval_line_plot.contains_key("eval_current"));
    }

    #[test]
    fn test_evaluation_runs_duration_per_opponent() {
        let matchup = Matchup::population(PolicyId::main(), 3);
        let mut trainer = SimTrainer::new(config(), matchup)
            .unwrap()
            .with_evaluation(Some("current"));
        assert_eq!(trainer.evaluation_duration(), 2);

        let report = trainer.evaluate().unwrap();
        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.episodes_this_iter, trainer.evaluation_duration() * 3);
    }

    #[test]
    fn test_evaluation_history_generations() {
        let matchup = Matchup::population(PolicyId::main(), 2);
        let mut trainer = SimTrainer::new(config(), matchup).unwrap().with_evaluation(None);

        let snapshot = trainer.opponents_snapshot();
        if let Some(evaluator) = trainer.evaluator_mut() {
            evaluator.push_generation("history", snapshot.clone());
            evaluator.push_generation("history", snapshot);
        }

        let report = trainer.evaluate().unwrap();
        assert!(report.line_plot.contains_key("eval_history_0"));
        assert!(report.line_plot.contains_key("eval_history_1"));
        assert!(report.line_plot.contains_key("eval_history_newest"));
    }

    #[test]
    fn test_shaping_reports_dense_weight() {
        let scheduler = AnnealScheduler::new();
        let shaper = apply_reward_shaping(&RewardShapingConfig::default(), &scheduler).unwrap();
        let matchup = Matchup::population(PolicyId::main(), 2);
        let mut trainer = SimTrainer::new(config(), matchup)
            .unwrap()
            .with_reward_shaping(shaper);

        let result = trainer.train().unwrap();
        assert_eq!(result.custom_metrics["dense_weight"], 1.0);

        scheduler.value(REWARD_SHAPING, 0.0).unwrap();
        let result = trainer.train().unwrap();
        assert_eq!(result.custom_metrics["dense_weight"], 0.0);
    }

    #[test]
    fn test_deactivated_opponents_not_scheduled() {
        let matchup = Matchup::population(PolicyId::main(), 3);
        let mut trainer = SimTrainer::new(config(), matchup).unwrap();
        trainer.matchup_mut().opponents.set_active(0, false);
        trainer.matchup_mut().opponents.set_active(1, false);

        let result = trainer.train().unwrap();
        assert_eq!(result.timesteps_of("op_0"), 0);
        assert_eq!(result.timesteps_of("op_2"), 50);
    }
}
