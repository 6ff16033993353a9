//! PBT evaluation - current and historical opponent generations
//!
//! Level 1 - Orchestration
//!
//! Each evaluation key names an opponent pool. A pool is either the current
//! set of opponents or a history of generations; every generation is
//! evaluated with the batched evaluator and the main policy's mean reward
//! lands in a line plot keyed `eval_<key>`, `eval_<key>_<gen>` and
//! `eval_<key>_newest`.

use std::collections::BTreeMap;

use pbt_core::{EpisodeSummary, Opponent, Result, RolloutWorker, MAIN_POLICY};
use serde::{Deserialize, Serialize};

use crate::batched::evaluate_opponents;
use crate::config::EvalConfig;

/// Opponents evaluated under one key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentPool {
    /// A single set of opponents
    Current(Vec<Opponent>),
    /// Generations of opponents, oldest first
    History(Vec<Vec<Opponent>>),
}

impl OpponentPool {
    /// Number of generations the pool will evaluate
    pub fn generations(&self) -> usize {
        match self {
            OpponentPool::Current(_) => 1,
            OpponentPool::History(gens) => gens.len(),
        }
    }
}

/// Result of one PBT evaluation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Summary of the last generation evaluated
    pub metrics: Option<EpisodeSummary>,
    /// Main policy mean reward per evaluated key/generation
    pub line_plot: BTreeMap<String, f64>,
}

impl EvalReport {
    /// Flatten into one metrics map for logging
    pub fn to_flat(&self) -> BTreeMap<String, f64> {
        let mut flat = self
            .metrics
            .as_ref()
            .map(EpisodeSummary::to_flat)
            .unwrap_or_default();
        for (key, value) in &self.line_plot {
            flat.insert(format!("my_eval_line_plot/{}", key), *value);
        }
        flat
    }
}

/// Evaluates the main policy against keyed opponent pools
#[derive(Clone, Debug, Default)]
pub struct PbtEvaluator {
    pools: BTreeMap<String, OpponentPool>,
    config: EvalConfig,
}

impl PbtEvaluator {
    pub fn new(config: EvalConfig) -> Self {
        Self {
            pools: BTreeMap::new(),
            config,
        }
    }

    /// Replace the pool under `key`
    pub fn set_pool(&mut self, key: impl Into<String>, pool: OpponentPool) {
        self.pools.insert(key.into(), pool);
    }

    /// Append a generation to the history under `key`
    ///
    /// A `Current` pool under the same key becomes the first generation.
    pub fn push_generation(&mut self, key: impl Into<String>, generation: Vec<Opponent>) {
        let pool = self
            .pools
            .entry(key.into())
            .or_insert_with(|| OpponentPool::History(Vec::new()));
        match pool {
            OpponentPool::History(gens) => gens.push(generation),
            OpponentPool::Current(current) => {
                let first = std::mem::take(current);
                *pool = OpponentPool::History(vec![first, generation]);
            }
        }
    }

    pub fn pools(&self) -> &BTreeMap<String, OpponentPool> {
        &self.pools
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Run every pool through the batched evaluator (Level 1 orchestration)
    pub fn evaluate<W: RolloutWorker>(&self, workers: &mut [W]) -> Result<EvalReport> {
        let mut report = EvalReport::default();

        for (key, pool) in &self.pools {
            match pool {
                OpponentPool::History(generations) => {
                    self.evaluate_history(key, generations, workers, &mut report)?
                }
                OpponentPool::Current(opponents) => {
                    let summary = evaluate_opponents(workers, opponents, &self.config)?;
                    if let Some(mean) = summary.policy_mean(MAIN_POLICY) {
                        report.line_plot.insert(format!("eval_{}", key), mean);
                    }
                    report.metrics = Some(summary);
                }
            }
        }

        tracing::info!("PBT evaluation finished: {} line plot entries", report.line_plot.len());
        Ok(report)
    }

    // ========================================================================
    // Level 2 - Phases
    // ========================================================================

    fn evaluate_history<W: RolloutWorker>(
        &self,
        key: &str,
        generations: &[Vec<Opponent>],
        workers: &mut [W],
        report: &mut EvalReport,
    ) -> Result<()> {
        let newest = generations.len().saturating_sub(1);
        for (i, generation) in generations.iter().enumerate() {
            let summary = evaluate_opponents(workers, generation, &self.config)?;
            if let Some(mean) = summary.policy_mean(MAIN_POLICY) {
                report.line_plot.insert(format!("eval_{}_{}", key, i), mean);
                if i == newest {
                    report.line_plot.insert(format!("eval_{}_newest", key), mean);
                }
            }
            report.metrics = Some(summary);
        }
        Ok(())
    }
}
