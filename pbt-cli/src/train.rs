//! Train command - selfplay, attack and PBT runs
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run(), train() - orchestration
//! - Level 2: resolve_settings(), prepare_run(), build_session(), run_training_loop()
//! - Level 3: update_annealer(), log_iteration(), save_checkpoint(), load_victim()
//! - Level 4: file I/O, formatting utilities

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use pbt_core::{all_weights, PolicyId, TrainResult, Trainer};
use pbt_eval::{log_eval_report, EvalReport, FanoutSink, JsonlSink, MetricsSink, TracingSink};
use pbt_schedule::{apply_reward_shaping, AnnealScheduler, REWARD_SHAPING};
use pbt_sim::{Matchup, SimTrainer};
use rand::Rng;

use crate::checkpoint::{resolve_checkpoint, CheckpointStore};
use crate::config::{Settings, TrainMode};

/// Pool refreshed with the current population before each evaluation
const CURRENT_POOL: &str = "current";
/// Pool of population snapshots taken at each checkpoint
const HISTORY_POOL: &str = "history";

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct TrainArgs {
    /// JSON settings files, merged in order
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    pub configs: Vec<PathBuf>,

    /// Inline JSON merged over the settings files
    #[arg(short = 'p', long = "override", value_name = "JSON")]
    pub override_json: Option<String>,

    /// Training mode (overrides the settings)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Total timesteps (overrides the settings)
    #[arg(long)]
    pub max_timesteps: Option<u64>,

    /// Output directory (overrides the settings)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Reward shaping preset
    #[arg(long, value_name = "PRESET")]
    pub shaping: Option<String>,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ModeArg {
    Selfplay,
    TwoPolicySelfplay,
    Attack,
    Pbt,
}

impl From<ModeArg> for TrainMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Selfplay => TrainMode::Selfplay,
            ModeArg::TwoPolicySelfplay => TrainMode::TwoPolicySelfplay,
            ModeArg::Attack => TrainMode::Attack,
            ModeArg::Pbt => TrainMode::Pbt,
        }
    }
}

/// A trainer together with what the loop needs to drive it
pub struct TrainingSession {
    pub trainer: SimTrainer,
    /// `(policy, label)` pairs whose reward is logged each iteration
    pub log_setup: Vec<(PolicyId, String)>,
    /// Annealer registry when reward shaping is on
    pub annealers: Option<Arc<AnnealScheduler>>,
    /// Snapshot the population into the history pool at each checkpoint
    pub record_history: bool,
}

/// Where a run writes
pub struct RunContext {
    pub settings: Settings,
    pub metadata: serde_json::Value,
    pub checkpoint_freq: u64,
    pub store: CheckpointStore,
    pub sink: FanoutSink,
    pub show_progress: bool,
}

/// Summary of a finished run
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub timesteps_total: u64,
    pub iterations: usize,
    pub checkpoints: Vec<PathBuf>,
    pub last_result: Option<TrainResult>,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run the train command
///
/// 1. Resolve settings and the output directory
/// 2. Build the trainer for the selected mode
/// 3. Train until `max_timesteps`, checkpointing along the way
/// 4. Save the final checkpoint and print a summary
pub fn run(args: TrainArgs, seed: Option<u64>) -> Result<()> {
    let settings = resolve_settings(&args, seed)?;
    tracing::info!("Training with mode {}", settings.trial.mode.as_str());

    let mut ctx = prepare_run(settings, !args.quiet)?;
    let mut session = build_session(&ctx.settings)?;

    let started = std::time::Instant::now();
    let summary = train(&mut session, &mut ctx)?;

    tracing::info!(
        "Training took {:.2} minutes",
        started.elapsed().as_secs_f64() / 60.0
    );
    tracing::info!("Checkpoints written to {}", ctx.store.dir().display());
    print_summary(&summary, &session);
    Ok(())
}

/// Train a prepared session, saving a checkpoint if training fails
pub fn train(session: &mut TrainingSession, ctx: &mut RunContext) -> Result<RunSummary> {
    let outcome = run_training_loop(session, ctx);

    match outcome {
        Ok(mut summary) => {
            let path = save_checkpoint(session, ctx, summary.timesteps_total)?;
            summary.checkpoints.push(path);
            Ok(summary)
        }
        Err(err) => {
            tracing::error!("Encountered error, saving checkpoint before re-raising: {:#}", err);
            let timesteps = session.trainer.timesteps_total();
            save_checkpoint(session, ctx, timesteps)?;
            Err(err)
        }
    }
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Merge settings sources and apply command-line overrides
fn resolve_settings(args: &TrainArgs, seed: Option<u64>) -> Result<Settings> {
    let mut settings = Settings::load(&args.configs, args.override_json.as_deref())?;

    if let Some(mode) = args.mode {
        settings.trial.mode = mode.into();
    }
    if let Some(max) = args.max_timesteps {
        settings.rl.max_timesteps = max;
    }
    if let Some(out) = &args.out {
        settings.trial.out_path = out.clone();
    }
    if let Some(preset) = &args.shaping {
        let config = pbt_schedule::RewardShapingConfig::preset(preset)
            .with_context(|| format!("Unknown reward shaping preset: {}", preset))?;
        settings.rl.reward_shaping = Some(config);
    }

    // Command-line seed wins, then settings, then a fresh random one
    let seed = seed
        .or(settings.trial.seed)
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..u32::MAX as u64));
    settings.trial.seed = Some(seed);
    tracing::info!("Seed: {}", seed);

    Ok(settings)
}

/// Create the run directory, checkpoint store and metric sinks
pub fn prepare_run(settings: Settings, show_progress: bool) -> Result<RunContext> {
    let checkpoint_freq = settings.checkpoint_freq()?;
    configure_thread_pool(settings.trial.num_workers);

    let run_dir = run_directory(&settings);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

    let metadata = serde_json::to_value(&settings)?;
    std::fs::write(
        run_dir.join("settings.json"),
        serde_json::to_string_pretty(&metadata)?,
    )
    .context("Failed to write settings.json")?;

    let store = CheckpointStore::new(run_dir.join("checkpoints"))?;
    let sink = build_sink(&run_dir, settings.trial.disable_log)?;

    tracing::info!(
        "Run {} in {} (checkpoint every {} timesteps)",
        settings.run_name(),
        run_dir.display(),
        checkpoint_freq
    );

    Ok(RunContext {
        settings,
        metadata,
        checkpoint_freq,
        store,
        sink,
        show_progress,
    })
}

/// Build the trainer, log setup and annealers for the configured mode
pub fn build_session(settings: &Settings) -> Result<TrainingSession> {
    let config = settings.trainer_config()?;

    let (matchup, log_setup, record_history) = match settings.trial.mode {
        TrainMode::Selfplay => {
            let shared = PolicyId::new("shared_policy");
            let matchup = Matchup::fixed(shared.clone(), vec![shared.clone()], &[shared.clone()]);
            (matchup, vec![(shared, "shared_policy".to_string())], false)
        }
        TrainMode::TwoPolicySelfplay => {
            let (p0, p1) = (PolicyId::for_agent(0), PolicyId::for_agent(1));
            let trainable = if settings.two_policy_selfplay.train_only_one_policy {
                vec![p1.clone()]
            } else {
                vec![p0.clone(), p1.clone()]
            };
            let matchup = Matchup::fixed(p0.clone(), vec![p1.clone()], &trainable);
            let log_setup = vec![(p0, "policy_0".to_string()), (p1, "policy_1".to_string())];
            (matchup, log_setup, false)
        }
        TrainMode::Attack => {
            let adversary_id = settings.attack.adversary_id;
            if adversary_id > 1 {
                bail!("attack.adversary_id must be 0 or 1, got {}", adversary_id);
            }
            let adversary = PolicyId::for_agent(adversary_id);
            let victim = PolicyId::for_agent(1 - adversary_id);
            let matchup = Matchup::fixed(adversary.clone(), vec![victim], &[adversary.clone()]);
            (matchup, vec![(adversary, "adversary".to_string())], false)
        }
        TrainMode::Pbt => {
            let matchup = Matchup::population(PolicyId::main(), settings.rl.num_opponents);
            let mut log_setup = vec![(PolicyId::main(), "main".to_string())];
            log_setup.extend(
                matchup
                    .opponents
                    .opponent_policies
                    .iter()
                    .map(|p| (p.clone(), p.to_string())),
            );
            (matchup, log_setup, true)
        }
    };

    let mut trainer = SimTrainer::new(config, matchup)?;

    let annealers = match &settings.rl.reward_shaping {
        Some(shaping) => {
            let annealers = AnnealScheduler::new();
            let shaper = apply_reward_shaping(shaping, &annealers)?;
            trainer = trainer.with_reward_shaping(shaper);
            Some(annealers)
        }
        None => None,
    };

    if settings.rl.eval.evaluation_interval > 0 {
        let key = if settings.trial.mode == TrainMode::Pbt {
            CURRENT_POOL
        } else {
            "opponent"
        };
        trainer = trainer.with_evaluation(Some(key));
    }

    if settings.trial.mode == TrainMode::Attack {
        load_victim(&mut trainer, settings)?;
    }

    Ok(TrainingSession {
        trainer,
        log_setup,
        annealers,
        record_history,
    })
}

/// Call `train()` until `max_timesteps` (Level 2 phase)
pub fn run_training_loop(session: &mut TrainingSession, ctx: &mut RunContext) -> Result<RunSummary> {
    let max_timesteps = ctx.settings.rl.max_timesteps;
    let mut next_checkpoint = ctx.checkpoint_freq;
    let mut summary = RunSummary {
        timesteps_total: 0,
        iterations: 0,
        checkpoints: Vec::new(),
        last_result: None,
    };

    let progress = create_progress_bar(max_timesteps, ctx.show_progress)?;

    while summary.timesteps_total < max_timesteps {
        let result = session.trainer.train()?;
        summary.timesteps_total = result.timesteps_total;
        summary.iterations += 1;

        update_annealer(session, &result, max_timesteps)?;
        log_iteration(session, &result, &mut ctx.sink)?;

        if summary.timesteps_total > next_checkpoint {
            let path = save_checkpoint(session, ctx, summary.timesteps_total)?;
            summary.checkpoints.push(path);
            next_checkpoint += ctx.checkpoint_freq;
        }

        progress.set_position(summary.timesteps_total.min(max_timesteps));
        summary.last_result = Some(result);
    }

    progress.finish_and_clear();
    Ok(summary)
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

/// Advance the shaping annealer to the fraction of training remaining
fn update_annealer(session: &TrainingSession, result: &TrainResult, max_timesteps: u64) -> Result<()> {
    let annealers = match &session.annealers {
        Some(annealers) => annealers,
        None => return Ok(()),
    };

    if let Some(metric) = annealers.watched_metric(REWARD_SHAPING) {
        if let Some(value) = result.metric(&metric) {
            annealers.observe(REWARD_SHAPING, value)?;
        }
    }

    let frac_remaining =
        max_timesteps.saturating_sub(result.timesteps_total) as f64 / max_timesteps as f64;
    let value = annealers.value(REWARD_SHAPING, frac_remaining)?;
    tracing::debug!("Annealer {} = {:.4} (frac_remaining={:.3})", REWARD_SHAPING, value, frac_remaining);
    Ok(())
}

/// Log per-policy rewards, custom metrics and evaluation line plots
fn log_iteration<S: MetricsSink + ?Sized>(
    session: &TrainingSession,
    result: &TrainResult,
    sink: &mut S,
) -> Result<()> {
    let timestep = result.timesteps_total as f64;

    for (policy, label) in &session.log_setup {
        match result.policy_reward_mean.get(policy) {
            Some(value) => {
                let mut record = std::collections::BTreeMap::new();
                record.insert(format!("{}_reward", label), *value);
                record.insert("timestep".to_string(), timestep);
                sink.log(&record)?;
            }
            None => tracing::info!(
                "No result values collected for {}. If this keeps happening episodes may not be ending",
                policy
            ),
        }
    }

    if !result.custom_metrics.is_empty() {
        let mut record = result.custom_metrics.clone();
        record.insert("timestep".to_string(), timestep);
        sink.log(&record)?;
    }

    if !result.eval_line_plot.is_empty() {
        let report = EvalReport {
            metrics: None,
            line_plot: result.eval_line_plot.clone(),
        };
        log_eval_report(sink, &report, result.timesteps_total, result.timesteps_total)?;
    }
    Ok(())
}

/// Save a checkpoint and, for PBT, snapshot the population into the history
fn save_checkpoint(session: &mut TrainingSession, ctx: &mut RunContext, timesteps: u64) -> Result<PathBuf> {
    let weights = all_weights(&session.trainer);
    let path = ctx.store.save(
        weights,
        ctx.settings.trial.mode.as_str(),
        timesteps,
        &ctx.metadata,
    )?;

    if session.record_history {
        let snapshot = session.trainer.opponents_snapshot();
        if let Some(evaluator) = session.trainer.evaluator_mut() {
            evaluator.push_generation(HISTORY_POOL, snapshot);
        }
    }
    Ok(path)
}

/// Install the victim's weights from its checkpoint
fn load_victim(trainer: &mut SimTrainer, settings: &Settings) -> Result<()> {
    let path = settings
        .attack
        .victim_checkpoint
        .as_ref()
        .context("attack mode needs attack.victim_checkpoint")?;
    let file = resolve_checkpoint(path)?;
    let checkpoint = CheckpointStore::load(&file)?;

    let victim_id = 1 - settings.attack.adversary_id;
    let saved_name = match &settings.attack.victim_policy_name {
        Some(name) => name.clone(),
        None => {
            let fallback = PolicyId::for_agent(victim_id).to_string();
            tracing::info!(
                "Using {} as automatic fallback because no victim policy name was provided",
                fallback
            );
            fallback
        }
    };

    let weights = checkpoint.policy(&saved_name)?.clone();
    let mut map = pbt_core::WeightMap::new();
    map.insert(PolicyId::for_agent(victim_id), weights);
    trainer.set_weights(map)?;

    tracing::info!("Loaded victim {} from {}", saved_name, file.display());
    Ok(())
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

/// `<out_path>/<run_name>_<timestamp>`
fn run_directory(settings: &Settings) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    settings
        .trial
        .out_path
        .join(format!("{}_{}", settings.run_name(), stamp))
}

fn build_sink(run_dir: &Path, disable_log: bool) -> Result<FanoutSink> {
    let mut sink = FanoutSink::new();
    sink.push(Box::new(TracingSink));
    if !disable_log {
        let path = run_dir.join("metrics.jsonl");
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        sink.push(Box::new(JsonlSink::new(BufWriter::new(file))));
    }
    Ok(sink)
}

fn configure_thread_pool(num_workers: usize) {
    if num_workers == 0 {
        return;
    }
    // Fails only when a global pool already exists
    if rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .build_global()
        .is_err()
    {
        tracing::debug!("Rayon thread pool already configured");
    }
}

fn create_progress_bar(max_timesteps: u64, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(max_timesteps);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} timesteps ({eta})")?,
    );
    Ok(bar)
}

fn print_summary(summary: &RunSummary, session: &TrainingSession) {
    println!("\n=== Training Summary ===");
    println!("Timesteps:   {}", summary.timesteps_total);
    println!("Iterations:  {}", summary.iterations);
    println!("Checkpoints: {}", summary.checkpoints.len());
    if let Some(last) = summary.checkpoints.last() {
        println!("Latest:      {}", last.display());
    }

    if let Some(result) = &summary.last_result {
        for (policy, label) in &session.log_setup {
            if let Some(value) = result.policy_reward_mean.get(policy) {
                println!("  {:<16} {:>8.3}", label, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbt_eval::MemorySink;

    fn quick_settings(mode: TrainMode) -> Settings {
        let mut settings = Settings::default();
        settings.trial.mode = mode;
        settings.trial.seed = Some(11);
        settings.rl.max_timesteps = 200;
        settings.rl.train_batch_size = 50;
        settings.rl.horizon = 5;
        settings.rl.num_opponents = 2;
        settings.rl.eval.evaluation_duration = 2;
        settings.rl.eval.evaluation_num_workers = 2;
        settings
    }

    #[test]
    fn test_build_session_modes() {
        let selfplay = build_session(&quick_settings(TrainMode::Selfplay)).unwrap();
        assert_eq!(selfplay.log_setup.len(), 1);
        assert_eq!(selfplay.trainer.matchup().learner.as_str(), "shared_policy");

        let two = build_session(&quick_settings(TrainMode::TwoPolicySelfplay)).unwrap();
        assert_eq!(two.trainer.matchup().trainable.len(), 2);

        let pbt = build_session(&quick_settings(TrainMode::Pbt)).unwrap();
        assert_eq!(pbt.log_setup.len(), 3);
        assert!(pbt.record_history);
    }

    #[test]
    fn test_train_only_one_policy() {
        let mut settings = quick_settings(TrainMode::TwoPolicySelfplay);
        settings.two_policy_selfplay.train_only_one_policy = true;
        let session = build_session(&settings).unwrap();
        let trainable: Vec<&str> = session.trainer.matchup().trainable.iter().map(|p| p.as_str()).collect();
        assert_eq!(trainable, vec!["policy_1"]);
    }

    fn temp_out(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pbt-train-{}-{}", name, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    /// Checkpoint of a two-policy run trained for one iteration
    fn two_policy_checkpoint(dir: &Path) -> pbt_core::WeightMap {
        let mut source = build_session(&quick_settings(TrainMode::TwoPolicySelfplay)).unwrap();
        source.trainer.train().unwrap();
        let saved = all_weights(&source.trainer);
        let mut store = CheckpointStore::new(dir).unwrap();
        store
            .save(saved.clone(), "two_policy_selfplay", 50, &serde_json::Value::Null)
            .unwrap();
        saved
    }

    #[test]
    fn test_attack_requires_victim() {
        assert!(build_session(&quick_settings(TrainMode::Attack)).is_err());
    }

    #[test]
    fn test_attack_rejects_third_side() {
        let dir = temp_out("third-side");
        two_policy_checkpoint(&dir);

        let mut settings = quick_settings(TrainMode::Attack);
        settings.attack.victim_checkpoint = Some(dir.clone());
        settings.attack.adversary_id = 2;
        assert!(build_session(&settings).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_attack_loads_frozen_victim() {
        for adversary_id in [1usize, 0] {
            let dir = temp_out(&format!("victim-{}", adversary_id));
            let saved = two_policy_checkpoint(&dir);

            let mut settings = quick_settings(TrainMode::Attack);
            settings.attack.victim_checkpoint = Some(dir.clone());
            settings.attack.adversary_id = adversary_id;
            let mut session = build_session(&settings).unwrap();

            // Victim name falls back to policy_<victim_id>
            let adversary = PolicyId::for_agent(adversary_id);
            let victim = PolicyId::for_agent(1 - adversary_id);
            assert_eq!(session.trainer.matchup().learner, adversary);
            assert_eq!(session.trainer.get_weights(&victim).unwrap(), saved[&victim]);

            session.trainer.train().unwrap();
            assert_eq!(session.trainer.get_weights(&victim).unwrap(), saved[&victim]);
            assert_ne!(session.trainer.get_weights(&adversary).unwrap(), saved[&adversary]);

            std::fs::remove_dir_all(&dir).ok();
        }
    }

    #[test]
    fn test_attack_named_victim_policy() {
        let dir = temp_out("named-victim");
        let saved = two_policy_checkpoint(&dir);

        // Adversary plays policy_1, victim slot policy_0 takes the saved policy_1
        let mut settings = quick_settings(TrainMode::Attack);
        settings.attack.victim_checkpoint = Some(dir.clone());
        settings.attack.victim_policy_name = Some("policy_1".to_string());
        let session = build_session(&settings).unwrap();

        let loaded = session.trainer.get_weights(&PolicyId::for_agent(0)).unwrap();
        assert_eq!(loaded, saved[&PolicyId::for_agent(1)]);

        settings.attack.victim_policy_name = Some("ghost".to_string());
        assert!(build_session(&settings).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_error_saves_checkpoint_and_reraises() {
        let mut settings = quick_settings(TrainMode::Pbt);
        settings.trial.out_path = temp_out("error");
        settings.rl.eval.evaluation_num_workers = 0;

        let mut ctx = prepare_run(settings, false).unwrap();
        let mut session = build_session(&ctx.settings).unwrap();

        let err = train(&mut session, &mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<pbt_core::PbtError>(),
            Some(pbt_core::PbtError::NoWorkers(2))
        ));

        let checkpoints = ctx.store.list().unwrap();
        assert_eq!(checkpoints.len(), 1);
        let saved = CheckpointStore::load(&checkpoints[0]).unwrap();
        assert_eq!(saved.timesteps_total, 50);

        std::fs::remove_dir_all(&ctx.settings.trial.out_path).ok();
    }

    #[test]
    fn test_update_annealer_tracks_progress() {
        let mut settings = quick_settings(TrainMode::Pbt);
        settings.rl.reward_shaping = pbt_schedule::RewardShapingConfig::preset("default");
        let session = build_session(&settings).unwrap();

        let result = TrainResult {
            timesteps_total: 100,
            ..Default::default()
        };
        update_annealer(&session, &result, 200).unwrap();

        // Linear 1 -> 0 over the first half of training, half of it remaining
        let annealers = session.annealers.as_ref().unwrap();
        assert!(annealers.cached(REWARD_SHAPING).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_pbt_run_checkpoints_and_history() {
        let out = std::env::temp_dir().join(format!("pbt-train-test-{}", std::process::id()));
        std::fs::remove_dir_all(&out).ok();

        let mut settings = quick_settings(TrainMode::Pbt);
        settings.trial.out_path = out.clone();
        settings.trial.num_checkpoints = Some(2);

        let mut ctx = prepare_run(settings, false).unwrap();
        let mut session = build_session(&ctx.settings).unwrap();
        let summary = train(&mut session, &mut ctx).unwrap();

        // 4 iterations of 50 steps; 150 is the first total past 100, then the final one
        assert_eq!(summary.timesteps_total, 200);
        assert_eq!(summary.iterations, 4);
        assert_eq!(summary.checkpoints.len(), 2);
        assert_eq!(ctx.store.list().unwrap().len(), 2);

        let history = &session.trainer.evaluator_mut().unwrap().pools()[HISTORY_POOL];
        assert_eq!(history.generations(), 2);

        let metrics = std::fs::read_to_string(ctx.store.dir().parent().unwrap().join("metrics.jsonl")).unwrap();
        assert!(metrics.lines().any(|l| l.contains("main_reward")));
        assert!(metrics.lines().any(|l| l.contains("eval_current")));

        std::fs::remove_dir_all(&out).ok();
    }

    #[test]
    fn test_log_iteration_records() {
        let session = build_session(&quick_settings(TrainMode::Pbt)).unwrap();
        let mut result = TrainResult {
            timesteps_total: 40,
            ..Default::default()
        };
        result.policy_reward_mean.insert(PolicyId::main(), 0.5);
        result.custom_metrics.insert("dense_weight".to_string(), 0.3);
        result.eval_line_plot.insert("eval_current".to_string(), 0.1);

        let mut sink = MemorySink::default();
        log_iteration(&session, &result, &mut sink).unwrap();

        // main reward, custom metrics, one eval line
        assert_eq!(sink.records.len(), 3);
        assert_eq!(sink.records[0]["main_reward"], 0.5);
        assert_eq!(sink.records[1]["dense_weight"], 0.3);
        assert_eq!(sink.records[2]["eval_current"], 0.1);
        assert_eq!(sink.records[2]["timestep_agg"], 40.0);
    }
}
