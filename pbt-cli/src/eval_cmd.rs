//! Eval command - score a checkpoint against opponent pools
//!
//! `--opponents` may name a checkpoint file, evaluated as one `current`
//! pool, or a checkpoint directory, evaluated as a `history` pool with one
//! generation per checkpoint.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use pbt_core::{Opponent, PolicyId, RolloutWorker, WeightMap};
use pbt_eval::{EvalConfig, EvalReport, OpponentPool, PbtEvaluator};
use pbt_sim::{DuelEnv, MatrixGame, SimWorker};

use crate::checkpoint::{resolve_checkpoint, Checkpoint, CheckpointStore};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct EvalArgs {
    /// Checkpoint file or directory holding the evaluated policy
    #[arg(long, value_name = "PATH")]
    pub main: PathBuf,

    /// Name of the evaluated policy inside its checkpoint
    #[arg(long, default_value = "main")]
    pub main_policy: String,

    /// Checkpoint file (current pool) or directory (history pool)
    #[arg(long, value_name = "PATH")]
    pub opponents: PathBuf,

    /// Only policies whose name starts with this prefix are opponents
    #[arg(long, default_value = "op_")]
    pub opponent_prefix: String,

    /// Matrix game preset
    #[arg(long, default_value = "rock_paper_scissors")]
    pub game: String,

    /// Moves per episode
    #[arg(long, default_value = "25")]
    pub horizon: u32,

    /// Episodes per worker per pass
    #[arg(long, default_value = "10")]
    pub duration: usize,

    /// Evaluation workers
    #[arg(long, default_value = "10")]
    pub workers: usize,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run the eval command
pub fn run(args: EvalArgs, seed: Option<u64>) -> Result<()> {
    let seed = seed.unwrap_or(0);

    let main_file = resolve_checkpoint(&args.main)?;
    let main_checkpoint = CheckpointStore::load(&main_file)?;
    let main_weights = main_checkpoint.policy(&args.main_policy)?.clone();
    tracing::info!("Evaluating {} from {}", args.main_policy, main_file.display());

    let (key, pool) = load_pool(&args.opponents, &args.opponent_prefix)?;
    tracing::info!("Opponent pool {}: {} generation(s)", key, pool.generations());

    let config = EvalConfig::new(args.duration).with_workers(args.workers);
    let mut evaluator = PbtEvaluator::new(config);
    evaluator.set_pool(key, pool);

    let env = DuelEnv::new(MatrixGame::preset(&args.game)?, args.horizon)?;
    let mut workers = SimWorker::pool(&env, args.workers, seed);
    for worker in &mut workers {
        let mut weights = WeightMap::new();
        weights.insert(PolicyId::main(), main_weights.clone());
        worker.set_weights(weights)?;
    }

    let report = evaluator.evaluate(&mut workers)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_flat())?);
    } else {
        print_report(&report);
    }
    Ok(())
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Build the opponent pool from a checkpoint file or directory
fn load_pool(path: &Path, prefix: &str) -> Result<(String, OpponentPool)> {
    if path.is_file() {
        let checkpoint = CheckpointStore::load(path)?;
        let opponents = opponents_of(&checkpoint, prefix)?;
        return Ok(("current".to_string(), OpponentPool::Current(opponents)));
    }
    if !path.is_dir() {
        bail!("Opponent path does not exist: {}", path.display());
    }

    let files = CheckpointStore::new(path)?.list()?;
    if files.is_empty() {
        bail!("No checkpoints in {}", path.display());
    }
    let generations = files
        .iter()
        .map(|file| {
            let checkpoint = CheckpointStore::load(file)?;
            opponents_of(&checkpoint, prefix)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(("history".to_string(), OpponentPool::History(generations)))
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn opponents_of(checkpoint: &Checkpoint, prefix: &str) -> Result<Vec<Opponent>> {
    let opponents: Vec<Opponent> = checkpoint
        .weights
        .iter()
        .filter(|(id, _)| id.as_str().starts_with(prefix))
        .map(|(id, w)| Opponent::new(id.clone(), w.clone()))
        .collect();
    if opponents.is_empty() {
        let known: Vec<&str> = checkpoint.weights.keys().map(PolicyId::as_str).collect();
        bail!(
            "Checkpoint {} has no policies starting with {:?} (has: {})",
            checkpoint.number,
            prefix,
            known.join(", ")
        );
    }
    Ok(opponents)
}

fn print_report(report: &EvalReport) {
    println!("\n=== Evaluation ===");
    for (key, value) in &report.line_plot {
        println!("  {:<24} {:>8.3}", key, value);
    }
    if let Some(metrics) = &report.metrics {
        println!("\nLast pool: {} episodes", metrics.episodes_this_iter);
        for (policy, mean) in &metrics.policy_reward_mean {
            println!("  {:<24} {:>8.3}", policy, mean);
        }
    }
}
