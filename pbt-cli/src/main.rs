//! PBT CLI - Command-line interface
//!
//! Commands:
//! - train: Run selfplay, attack or population-based training
//! - eval: Score a checkpoint against opponent checkpoints
//! - anneal: Preview a reward shaping schedule

mod anneal_cmd;
mod checkpoint;
mod config;
mod eval_cmd;
mod train;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use anneal_cmd::AnnealArgs;
use eval_cmd::EvalArgs;
use train::TrainArgs;

#[derive(Parser)]
#[command(name = "pbt")]
#[command(about = "Population-based adversarial training")]
struct Cli {
    /// Random seed (random when omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train policies
    Train(TrainArgs),
    /// Evaluate a checkpoint against opponent pools
    Eval(EvalArgs),
    /// Print a reward shaping schedule
    Anneal(AnnealArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Train(args) => train::run(args, cli.seed),
        Commands::Eval(args) => eval_cmd::run(args, cli.seed),
        Commands::Anneal(args) => anneal_cmd::run(args, cli.seed),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).with_target(false).init();
}
