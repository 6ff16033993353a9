//! Annealers - training progress to blend weight
//!
//! An annealer is queried with the fraction of training still remaining
//! (1.0 at the start, 0.0 at the end) and answers with a weight, normally in
//! [0, 1], used to blend sparse and dense reward terms.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Annealing schedule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annealer {
    /// Always the same value
    Constant { value: f64 },
    /// Linear from `start` to `end` over the first `anneal_frac` of training
    Linear { start: f64, end: f64, anneal_frac: f64 },
    /// Decays when a watched metric crosses a threshold
    Conditional(ConditionalAnnealer),
}

impl Annealer {
    pub fn constant(value: f64) -> Self {
        Annealer::Constant { value }
    }

    pub fn linear(start: f64, end: f64, anneal_frac: f64) -> Self {
        Annealer::Linear {
            start,
            end,
            anneal_frac,
        }
    }

    /// Value at the given point of training
    ///
    /// Conditional annealers ignore `frac_remaining` and advance their
    /// wait counter instead.
    pub fn value(&mut self, frac_remaining: f64) -> f64 {
        match self {
            Annealer::Constant { value } => *value,
            Annealer::Linear {
                start,
                end,
                anneal_frac,
            } => linear_value(*start, *end, *anneal_frac, frac_remaining),
            Annealer::Conditional(cond) => cond.step(),
        }
    }

    /// Feed one observation of the watched metric; no-op for other kinds
    pub fn observe(&mut self, metric: f64) {
        if let Annealer::Conditional(cond) = self {
            cond.observe(metric);
        }
    }

    /// Name of the metric a conditional annealer watches
    pub fn watched_metric(&self) -> Option<&str> {
        match self {
            Annealer::Conditional(cond) => Some(cond.config.metric.as_str()),
            _ => None,
        }
    }
}

fn linear_value(start: f64, end: f64, anneal_frac: f64, frac_remaining: f64) -> f64 {
    let frac_remaining = frac_remaining.clamp(0.0, 1.0);
    let progress = if anneal_frac <= 0.0 {
        1.0
    } else {
        ((1.0 - frac_remaining) / anneal_frac).min(1.0)
    };
    start + progress * (end - start)
}

/// Comparison applied between the windowed metric mean and the threshold
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[default]
    Gt,
    Lt,
}

impl Comparison {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
        }
    }
}

/// Settings of a conditional annealer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalConfig {
    /// Metric whose observations drive the decay
    pub metric: String,
    pub start: f64,
    /// Floor of the decayed value
    pub end: f64,
    /// Multiplier applied on each decay
    pub decay_factor: f64,
    pub threshold: f64,
    pub operator: Comparison,
    /// Observations averaged before comparing
    pub window_size: usize,
    /// Updates to wait after a decay before the next one may happen
    pub min_wait: u32,
    /// Decay unconditionally after this many updates
    pub max_wait: Option<u32>,
}

impl Default for ConditionalConfig {
    fn default() -> Self {
        Self {
            metric: "episode_reward_mean".to_string(),
            start: 1.0,
            end: 0.0,
            decay_factor: 0.98,
            threshold: 0.0,
            operator: Comparison::Gt,
            window_size: 1,
            min_wait: 1,
            max_wait: None,
        }
    }
}

/// Annealer whose value decays when a metric condition holds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalAnnealer {
    pub config: ConditionalConfig,
    current: f64,
    since_decay: u32,
    window: VecDeque<f64>,
}

impl ConditionalAnnealer {
    pub fn new(config: ConditionalConfig) -> Self {
        let current = config.start;
        Self {
            config,
            current,
            since_decay: 0,
            window: VecDeque::new(),
        }
    }

    /// Record an observation of the watched metric
    pub fn observe(&mut self, metric: f64) {
        self.window.push_back(metric);
        while self.window.len() > self.config.window_size.max(1) {
            self.window.pop_front();
        }
    }

    /// Current value without advancing
    pub fn current(&self) -> f64 {
        self.current
    }

    fn step(&mut self) -> f64 {
        self.since_decay += 1;
        if self.since_decay < self.config.min_wait {
            return self.current;
        }

        let condition_met = self.window.len() >= self.config.window_size.max(1)
            && self
                .config
                .operator
                .holds(self.window_mean(), self.config.threshold);
        let timed_out = self
            .config
            .max_wait
            .map_or(false, |max| self.since_decay >= max);

        if condition_met || timed_out {
            self.current = (self.current * self.config.decay_factor).max(self.config.end);
            self.since_decay = 0;
            tracing::debug!(
                "Conditional annealer on {} decayed to {:.4}",
                self.config.metric,
                self.current
            );
        }
        self.current
    }

    fn window_mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_annealer() {
        let mut a = Annealer::constant(0.5);
        assert_eq!(a.value(1.0), 0.5);
        assert_eq!(a.value(0.0), 0.5);
    }

    #[test]
    fn test_linear_annealer_endpoints() {
        let mut a = Annealer::linear(1.0, 0.0, 0.5);
        assert_eq!(a.value(1.0), 1.0);
        // Halfway through the annealing window
        assert!((a.value(0.75) - 0.5).abs() < 1e-9);
        // Done after anneal_frac of training
        assert_eq!(a.value(0.5), 0.0);
        assert_eq!(a.value(0.1), 0.0);
    }

    #[test]
    fn test_linear_annealer_zero_frac_is_done() {
        let mut a = Annealer::linear(1.0, 0.0, 0.0);
        assert_eq!(a.value(1.0), 0.0);
    }

    #[test]
    fn test_linear_annealer_clamps_progress() {
        let mut a = Annealer::linear(1.0, 0.0, 1.0);
        assert_eq!(a.value(1.5), 1.0);
        assert_eq!(a.value(-0.5), 0.0);
    }

    #[test]
    fn test_conditional_decays_when_condition_holds() {
        let config = ConditionalConfig {
            decay_factor: 0.5,
            threshold: 1.0,
            ..Default::default()
        };
        let mut a = Annealer::Conditional(ConditionalAnnealer::new(config));

        // No observations yet
        assert_eq!(a.value(1.0), 1.0);

        a.observe(0.5);
        assert_eq!(a.value(1.0), 1.0);

        a.observe(2.0);
        assert_eq!(a.value(1.0), 0.5);
        assert_eq!(a.value(1.0), 0.25);
    }

    #[test]
    fn test_conditional_respects_min_wait_and_floor() {
        let config = ConditionalConfig {
            decay_factor: 0.1,
            end: 0.05,
            threshold: 0.0,
            min_wait: 3,
            ..Default::default()
        };
        let mut cond = ConditionalAnnealer::new(config);
        cond.observe(1.0);

        assert_eq!(cond.step(), 1.0);
        assert_eq!(cond.step(), 1.0);
        assert!((cond.step() - 0.1).abs() < 1e-9);
        cond.step();
        cond.step();
        assert_eq!(cond.step(), 0.05);
    }

    #[test]
    fn test_conditional_max_wait_forces_decay() {
        let config = ConditionalConfig {
            decay_factor: 0.5,
            threshold: 100.0,
            max_wait: Some(2),
            ..Default::default()
        };
        let mut cond = ConditionalAnnealer::new(config);
        cond.observe(0.0);

        assert_eq!(cond.step(), 1.0);
        assert_eq!(cond.step(), 0.5);
    }

    #[test]
    fn test_annealer_serde_tagged() {
        let a: Annealer =
            serde_json::from_str(r#"{"kind":"linear","start":1.0,"end":0.0,"anneal_frac":0.5}"#)
                .unwrap();
        assert_eq!(a, Annealer::linear(1.0, 0.0, 0.5));
    }
}
