//! Configuration for opponent evaluation
//!
//! Level 4 - Utilities and configuration

use serde::{Deserialize, Serialize};

/// Configuration for batched evaluation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Episodes each worker plays against its opponent per pass
    pub evaluation_duration: usize,
    /// Size of the evaluation worker pool
    pub evaluation_num_workers: usize,
    /// Whether workers in a pass sample in parallel
    pub parallel: bool,
    /// Training iterations between evaluations (0 disables evaluation)
    pub evaluation_interval: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            evaluation_duration: 10,
            evaluation_num_workers: 10,
            parallel: true,
            evaluation_interval: 1,
        }
    }
}

impl EvalConfig {
    /// Create config with specified episodes per opponent
    pub fn new(evaluation_duration: usize) -> Self {
        Self {
            evaluation_duration,
            ..Default::default()
        }
    }

    /// Set the worker pool size
    pub fn with_workers(mut self, evaluation_num_workers: usize) -> Self {
        self.evaluation_num_workers = evaluation_num_workers;
        self
    }

    /// Run workers one after another
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Whether evaluation is due after `iteration` (1-based) training iterations
    pub fn is_due(&self, iteration: usize) -> bool {
        self.evaluation_interval > 0 && iteration % self.evaluation_interval == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_config_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.evaluation_duration, 10);
        assert_eq!(config.evaluation_num_workers, 10);
        assert!(config.parallel);
    }

    #[test]
    fn test_eval_config_builders() {
        let config = EvalConfig::new(3).with_workers(2).sequential();
        assert_eq!(config.evaluation_duration, 3);
        assert_eq!(config.evaluation_num_workers, 2);
        assert!(!config.parallel);
    }

    #[test]
    fn test_evaluation_interval() {
        let mut config = EvalConfig::default();
        config.evaluation_interval = 5;
        assert!(!config.is_due(4));
        assert!(config.is_due(5));
        assert!(config.is_due(10));

        config.evaluation_interval = 0;
        assert!(!config.is_due(5));
    }
}
