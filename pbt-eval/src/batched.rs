//! Batched evaluation of opponents on a fixed worker pool
//!
//! Level 2 - Phase-level implementation
//!
//! With N workers and M opponents the evaluation runs in ceil(M / N)
//! passes. Each pass installs one opponent per worker, lets every active
//! worker play `evaluation_duration` episodes and collects them.

use pbt_core::{summarize_episodes, EpisodeMetrics, EpisodeSummary, Opponent, PbtError, Result, RolloutWorker};
use rayon::prelude::*;

use crate::config::EvalConfig;

/// Layout of one evaluation pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassPlan {
    /// Pass index
    pub pass: usize,
    /// Index of the opponent assigned to the first worker
    pub first_opponent: usize,
    /// Workers used this pass (the first `num_workers` of the pool)
    pub num_workers: usize,
}

impl PassPlan {
    /// Opponent indices covered by this pass
    pub fn opponents(&self) -> std::ops::Range<usize> {
        self.first_opponent..self.first_opponent + self.num_workers
    }
}

/// Evaluate every opponent against the workers' main policy (Level 2 phase)
///
/// # Arguments
/// * `workers` - Evaluation worker pool
/// * `opponents` - Opponents to evaluate, installed as `eval_op`
/// * `config` - Evaluation configuration
///
/// # Returns
/// Summary of all episodes across all passes
pub fn evaluate_opponents<W: RolloutWorker>(
    workers: &mut [W],
    opponents: &[Opponent],
    config: &EvalConfig,
) -> Result<EpisodeSummary> {
    let plans = plan_passes(workers.len(), opponents.len())?;

    let mut all_episodes = Vec::new();
    for plan in &plans {
        let episodes = run_pass(workers, opponents, plan, config)?;
        tracing::debug!(
            "Eval pass {}: opponents {:?} on {} workers, {} episodes",
            plan.pass,
            plan.opponents(),
            plan.num_workers,
            episodes.len()
        );
        all_episodes.extend(episodes);
    }

    let summary = summarize_episodes(&all_episodes);
    check_episode_count(&summary, &plans, workers.len(), opponents.len(), config);
    Ok(summary)
}

// ============================================================================
// Level 3 - Steps
// ============================================================================

/// Split `num_opponents` over `num_workers` into passes
pub fn plan_passes(num_workers: usize, num_opponents: usize) -> Result<Vec<PassPlan>> {
    if num_opponents == 0 {
        return Ok(Vec::new());
    }
    if num_workers == 0 {
        return Err(PbtError::NoWorkers(num_opponents));
    }

    let num_passes = num_opponents.div_ceil(num_workers);
    Ok((0..num_passes)
        .map(|pass| {
            let first_opponent = pass * num_workers;
            PassPlan {
                pass,
                first_opponent,
                num_workers: num_workers.min(num_opponents - first_opponent),
            }
        })
        .collect())
}

/// Run one pass and return its episodes
fn run_pass<W: RolloutWorker>(
    workers: &mut [W],
    opponents: &[Opponent],
    plan: &PassPlan,
    config: &EvalConfig,
) -> Result<Vec<EpisodeMetrics>> {
    let active = &mut workers[..plan.num_workers];

    discard_stale_episodes(active);
    install_opponents(active, &opponents[plan.opponents()])?;

    // Each sample() call plays exactly one episode per worker
    for _ in 0..config.evaluation_duration {
        sample_all(active, config.parallel)?;
    }

    Ok(active.iter_mut().flat_map(|w| w.collect_episodes()).collect())
}

/// Install opponent `k` into worker `k`
fn install_opponents<W: RolloutWorker>(workers: &mut [W], opponents: &[Opponent]) -> Result<()> {
    for (worker, opponent) in workers.iter_mut().zip(opponents) {
        worker.set_weights(opponent.as_eval_weights())?;
    }
    Ok(())
}

/// One episode on every worker
fn sample_all<W: RolloutWorker>(workers: &mut [W], parallel: bool) -> Result<()> {
    if parallel {
        workers.par_iter_mut().try_for_each(|w| w.sample())
    } else {
        workers.iter_mut().try_for_each(|w| w.sample())
    }
}

/// Drop episodes left over from earlier use of the workers
fn discard_stale_episodes<W: RolloutWorker>(workers: &mut [W]) {
    let stale: usize = workers.iter_mut().map(|w| w.collect_episodes().len()).sum();
    if stale > 0 {
        tracing::debug!("Discarded {} stale episodes before evaluation", stale);
    }
}

/// Warn when the number of episodes does not match the plan
fn check_episode_count(
    summary: &EpisodeSummary,
    plans: &[PassPlan],
    num_workers: usize,
    num_opponents: usize,
    config: &EvalConfig,
) {
    let expected = config.evaluation_duration * num_opponents;
    if summary.episodes_this_iter != expected {
        let last_pass_workers = plans.last().map_or(0, |p| p.num_workers);
        tracing::warn!(
            "Expected {} eval episodes, got {} (num_workers_this_pass={}, num_workers={}, num_opponents={})",
            expected,
            summary.episodes_this_iter,
            last_pass_workers,
            num_workers,
            num_opponents
        );
    }
}
