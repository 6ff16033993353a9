//! Shared registry of named annealers
//!
//! The training loop advances annealers with the fraction of training
//! remaining; environment-side code (reward shaping) only reads the cached
//! value through an `AnnealerHandle`. Both sides hold the same `Arc`.

use std::sync::Arc;

use parking_lot::Mutex;
use pbt_core::{PbtError, Result};
use rustc_hash::FxHashMap;

use crate::anneal::Annealer;

/// Registry name of the reward-shaping annealer
pub const REWARD_SHAPING: &str = "rew_shape";

struct Entry {
    annealer: Annealer,
    cached: f64,
}

/// Named annealers shared between the training loop and environments
#[derive(Default)]
pub struct AnnealScheduler {
    entries: Mutex<FxHashMap<String, Entry>>,
}

impl AnnealScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register (or replace) an annealer
    pub fn set_annealer(&self, name: &str, annealer: Annealer) {
        let cached = match &annealer {
            Annealer::Conditional(cond) => cond.current(),
            other => other.clone().value(1.0),
        };
        self.entries.lock().insert(
            name.to_string(),
            Entry {
                annealer,
                cached,
            },
        );
    }

    /// Advance an annealer to `frac_remaining` and cache the result
    pub fn value(&self, name: &str, frac_remaining: f64) -> Result<f64> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PbtError::UnknownAnnealer(name.to_string()))?;
        entry.cached = entry.annealer.value(frac_remaining);
        Ok(entry.cached)
    }

    /// Latest cached value
    pub fn cached(&self, name: &str) -> Result<f64> {
        self.entries
            .lock()
            .get(name)
            .map(|e| e.cached)
            .ok_or_else(|| PbtError::UnknownAnnealer(name.to_string()))
    }

    /// Feed a metric observation to a conditional annealer
    pub fn observe(&self, name: &str, metric: f64) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PbtError::UnknownAnnealer(name.to_string()))?;
        entry.annealer.observe(metric);
        Ok(())
    }

    /// Metric a conditional annealer watches, `None` for schedule-driven ones
    pub fn watched_metric(&self, name: &str) -> Option<String> {
        self.entries
            .lock()
            .get(name)
            .and_then(|e| e.annealer.watched_metric().map(str::to_string))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }
}

/// Read-only view of one annealer in a shared scheduler
#[derive(Clone)]
pub struct AnnealerHandle {
    scheduler: Arc<AnnealScheduler>,
    name: String,
}

impl AnnealerHandle {
    pub fn new(scheduler: Arc<AnnealScheduler>, name: impl Into<String>) -> Self {
        Self {
            scheduler,
            name: name.into(),
        }
    }

    /// Current value of the annealer
    pub fn value(&self) -> Result<f64> {
        self.scheduler.cached(&self.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for AnnealerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnealerHandle").field("name", &self.name).finish()
    }
}
