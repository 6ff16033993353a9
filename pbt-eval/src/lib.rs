//! PBT Eval - Batched opponent evaluation
//!
//! This crate provides evaluation infrastructure for population training:
//! - Batched evaluation of many opponents on a fixed worker pool
//! - Aggregation over current and historical opponent generations
//! - Metric sinks for evaluation line plots
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: PbtEvaluator::evaluate (orchestration)
//! - Level 2: evaluate_opponents (phases)
//! - Level 3: plan_passes, run_pass (steps)
//! - Level 4: configuration, sinks

mod config;
mod batched;
mod aggregate;
mod sink;

pub use config::EvalConfig;
pub use batched::{evaluate_opponents, plan_passes, PassPlan};
pub use aggregate::{EvalReport, OpponentPool, PbtEvaluator};
pub use sink::{log_eval_report, FanoutSink, JsonlSink, MemorySink, MetricsSink, TracingSink};
