//! Anneal command - preview a reward shaping schedule

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use pbt_schedule::{AnnealScheduler, RewardShapingConfig, REWARD_SHAPING};
use serde::Serialize;

#[derive(Args)]
pub struct AnnealArgs {
    /// Reward shaping preset
    #[arg(long, default_value = "default")]
    pub preset: String,

    /// JSON reward shaping settings (overrides --preset)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Points sampled between the start and end of training
    #[arg(long, default_value = "10")]
    pub steps: usize,

    /// Metric value observed before each step (conditional annealers)
    #[arg(long)]
    pub observe: Option<f64>,

    /// Print the schedule as JSON
    #[arg(long)]
    pub json: bool,
}

/// One sampled point of a schedule
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SchedulePoint {
    pub frac_remaining: f64,
    pub dense_weight: f64,
}

/// Run the anneal command
pub fn run(args: AnnealArgs, _seed: Option<u64>) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid reward shaping settings in {}", path.display()))?
        }
        None => RewardShapingConfig::preset(&args.preset)
            .with_context(|| format!("Unknown reward shaping preset: {}", args.preset))?,
    };
    if args.steps == 0 {
        bail!("--steps must be positive");
    }

    let points = sample_schedule(&config, args.steps, args.observe)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }

    if let Some(cond) = &config.conditional {
        println!(
            "Conditional annealer on {} (threshold {}, decay {}); values depend on observations",
            cond.metric, cond.threshold, cond.decay_factor
        );
    }
    println!("{:>14} {:>12}", "frac_remaining", "dense_weight");
    for point in &points {
        println!("{:>14.3} {:>12.4}", point.frac_remaining, point.dense_weight);
    }
    Ok(())
}

/// Step the configured annealer from the start to the end of training
///
/// # Arguments
/// * `config` - Reward shaping settings
/// * `steps` - Number of updates after the initial value
/// * `observe` - Metric fed to the annealer before each update
///
/// # Returns
/// `steps + 1` points, the first at `frac_remaining = 1`
pub fn sample_schedule(
    config: &RewardShapingConfig,
    steps: usize,
    observe: Option<f64>,
) -> Result<Vec<SchedulePoint>> {
    let annealers = AnnealScheduler::new();
    annealers.set_annealer(REWARD_SHAPING, config.annealer());

    let mut points = vec![SchedulePoint {
        frac_remaining: 1.0,
        dense_weight: annealers.cached(REWARD_SHAPING)?,
    }];
    for step in 1..=steps {
        if let Some(metric) = observe {
            annealers.observe(REWARD_SHAPING, metric)?;
        }
        let frac_remaining = 1.0 - step as f64 / steps as f64;
        points.push(SchedulePoint {
            frac_remaining,
            dense_weight: annealers.value(REWARD_SHAPING, frac_remaining)?,
        });
    }
    Ok(points)
}
