//! Trial and RL settings
//!
//! Level 4 - Configuration
//!
//! Settings start from their defaults; JSON override files are merged on top
//! in order, then any overrides the files name in `trial.override_files` and
//! `trial.override`, then the inline override string. Objects merge key by key,
//! everything else is replaced.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pbt_eval::EvalConfig;
use pbt_schedule::{OpponentScheduler, RewardShapingConfig};
use pbt_sim::SimTrainerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Checkpoints per run when no frequency is configured
pub const DEFAULT_NUM_CHECKPOINTS: u64 = 10;

/// Training mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainMode {
    /// One policy plays both sides
    #[default]
    Selfplay,
    /// Separate policy per side
    TwoPolicySelfplay,
    /// Adversary trains against a frozen victim
    Attack,
    /// Main policy against a population of opponents
    Pbt,
}

impl TrainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainMode::Selfplay => "selfplay",
            TrainMode::TwoPolicySelfplay => "two_policy_selfplay",
            TrainMode::Attack => "attack",
            TrainMode::Pbt => "pbt",
        }
    }
}

/// Settings of one training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialSettings {
    pub mode: TrainMode,
    pub out_path: PathBuf,
    /// Checkpoint every this many million timesteps
    pub checkpoint_freq_m: Option<f64>,
    /// Number of checkpoints spread over the run
    pub num_checkpoints: Option<u64>,
    /// Random when absent; the chosen seed is recorded in the settings
    pub seed: Option<u64>,
    /// Threads used for parallel evaluation
    pub num_workers: usize,
    /// Inline JSON merged over the settings
    #[serde(rename = "override")]
    pub override_json: Option<String>,
    /// JSON files merged over the settings, in order
    pub override_files: Vec<PathBuf>,
    pub run_name: Option<String>,
    /// Skip the metrics file
    pub disable_log: bool,
    pub description: String,
    pub lr: f64,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            mode: TrainMode::default(),
            out_path: PathBuf::from("out/"),
            checkpoint_freq_m: None,
            num_checkpoints: None,
            seed: None,
            num_workers: 4,
            override_json: None,
            override_files: Vec::new(),
            run_name: None,
            disable_log: false,
            description: String::new(),
            lr: 0.05,
        }
    }
}

/// Settings of the learning setup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlSettings {
    /// Matrix game preset
    pub env: String,
    pub max_timesteps: u64,
    /// Environment steps per training iteration
    pub train_batch_size: u64,
    /// Moves per episode
    pub horizon: u32,
    /// Population size in `pbt` mode
    pub num_opponents: usize,
    pub scheduler: OpponentScheduler,
    pub eval: EvalConfig,
    pub reward_shaping: Option<RewardShapingConfig>,
}

impl Default for RlSettings {
    fn default() -> Self {
        Self {
            env: "rock_paper_scissors".to_string(),
            max_timesteps: 1_500_000,
            train_batch_size: 4000,
            horizon: 25,
            num_opponents: 4,
            scheduler: OpponentScheduler::default(),
            eval: EvalConfig::default(),
            reward_shaping: None,
        }
    }
}

/// Settings of `attack` mode
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackSettings {
    /// Checkpoint file or directory holding the victim
    pub victim_checkpoint: Option<PathBuf>,
    /// Adversary trains `policy_<adversary_id>` (0 or 1) against `policy_<1 - adversary_id>`;
    /// the trained policy always takes the row side of the duel
    pub adversary_id: usize,
    /// Victim policy name inside the checkpoint, `policy_<victim_id>` when absent
    pub victim_policy_name: Option<String>,
}

impl Default for AttackSettings {
    fn default() -> Self {
        Self {
            victim_checkpoint: None,
            adversary_id: 1,
            victim_policy_name: None,
        }
    }
}

/// Settings of `two_policy_selfplay` mode
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoPolicySettings {
    /// Only `policy_1` trains
    pub train_only_one_policy: bool,
}

/// Everything a training run is configured with
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trial: TrialSettings,
    pub rl: RlSettings,
    pub attack: AttackSettings,
    pub two_policy_selfplay: TwoPolicySettings,
}

impl Settings {
    /// Build settings from defaults plus override files and an inline override
    pub fn load(files: &[PathBuf], inline: Option<&str>) -> Result<Self> {
        let mut value = serde_json::to_value(Settings::default())?;

        for file in files {
            merge_json(&mut value, read_json(file)?);
        }
        let inline_patch: Option<Value> = inline
            .map(|json| serde_json::from_str(json).context("Failed to parse override JSON"))
            .transpose()?;

        // Overrides named inside the settings files apply next
        let nested_files: Vec<PathBuf> = serde_json::from_value(
            value["trial"]["override_files"].clone(),
        )
        .unwrap_or_default();
        let nested_files: Vec<PathBuf> =
            nested_files.into_iter().filter(|f| !files.contains(f)).collect();
        for file in &nested_files {
            merge_json(&mut value, read_json(file)?);
        }
        if let Some(json) = value["trial"]["override"].as_str().map(str::to_string) {
            let patch: Value = serde_json::from_str(&json).context("Failed to parse trial.override")?;
            merge_json(&mut value, patch);
        }

        // The command-line override always wins
        if let Some(patch) = inline_patch {
            merge_json(&mut value, patch);
        }

        let mut settings: Settings =
            serde_json::from_value(value).context("Invalid settings")?;
        settings.trial.override_files = files.iter().chain(&nested_files).cloned().collect();
        if let Some(json) = inline {
            settings.trial.override_json.get_or_insert_with(|| json.to_string());
        }
        Ok(settings)
    }

    /// Timesteps between checkpoints
    ///
    /// Exactly one of `checkpoint_freq_m` and `num_checkpoints` may be set;
    /// with neither, the run is split into ten checkpoints.
    pub fn checkpoint_freq(&self) -> Result<u64> {
        let max = self.rl.max_timesteps;
        let freq = match (self.trial.checkpoint_freq_m, self.trial.num_checkpoints) {
            (Some(_), Some(_)) => {
                bail!("Can't set both checkpoint frequency and number of checkpoints, choose one")
            }
            (Some(freq_m), None) => (freq_m * 1_000_000.0) as u64,
            (None, Some(0)) => bail!("num_checkpoints must be positive"),
            (None, Some(n)) => max / n,
            (None, None) => {
                tracing::info!(
                    "No checkpoint freq given, setting to {} checkpoints overall",
                    DEFAULT_NUM_CHECKPOINTS
                );
                max / DEFAULT_NUM_CHECKPOINTS
            }
        };
        if freq == 0 {
            bail!("Checkpoint frequency rounds to zero timesteps (max_timesteps={})", max);
        }
        Ok(freq)
    }

    /// Run name, generated from mode, env and length when not configured
    pub fn run_name(&self) -> String {
        match &self.trial.run_name {
            Some(name) => name.clone(),
            None => format!(
                "{}_{}_{}Mts",
                self.trial.mode.as_str(),
                self.rl.env,
                self.rl.max_timesteps as f64 / 1_000_000.0
            ),
        }
    }

    /// Configuration handed to the reference trainer
    pub fn trainer_config(&self) -> Result<SimTrainerConfig> {
        let seed = self
            .trial
            .seed
            .context("Seed must be resolved before building the trainer")?;
        Ok(SimTrainerConfig {
            game: self.rl.env.clone(),
            horizon: self.rl.horizon,
            train_batch_size: self.rl.train_batch_size,
            lr: self.trial.lr,
            scheduler: self.rl.scheduler,
            eval: self.rl.eval.clone(),
            seed,
            ..Default::default()
        })
    }
}

/// Merge `patch` into `base`; objects merge recursively, other values replace
pub fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read override file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}
