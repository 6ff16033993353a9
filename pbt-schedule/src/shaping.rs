//! Reward shaping - blending sparse and dense reward terms
//!
//! Environments report named reward terms per agent. Each term is assigned a
//! type (sparse or dense) and a weight; the shaped reward is
//! `sparse * (1 - c) + dense * c` where `c` comes from an annealer, so dense
//! guidance can be faded out as training progresses.

use std::collections::BTreeMap;
use std::sync::Arc;

use pbt_core::{PbtError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::anneal::{Annealer, ConditionalAnnealer, ConditionalConfig};
use crate::scheduler::{AnnealScheduler, AnnealerHandle, REWARD_SHAPING};

/// Reward term weights grouped by type
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapingWeights {
    #[serde(default)]
    pub sparse: BTreeMap<String, f64>,
    #[serde(default)]
    pub dense: BTreeMap<String, f64>,
}

/// Reward shaping settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardShapingConfig {
    pub weights: ShapingWeights,
    /// Fraction of training over which the dense weight anneals from 1 to 0
    #[serde(default)]
    pub anneal_frac: Option<f64>,
    /// Metric-driven annealing, takes precedence over `anneal_frac`
    #[serde(default)]
    pub conditional: Option<ConditionalConfig>,
}

impl Default for RewardShapingConfig {
    fn default() -> Self {
        Self::preset("default").unwrap_or_else(|| Self {
            weights: ShapingWeights::default(),
            anneal_frac: None,
            conditional: None,
        })
    }
}

impl RewardShapingConfig {
    /// Named preset
    pub fn preset(name: &str) -> Option<Self> {
        let terms = |pairs: &[(&str, f64)]| -> BTreeMap<String, f64> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };

        let config = match name {
            "default" => Self {
                weights: ShapingWeights {
                    sparse: terms(&[("reward_remaining", 0.01)]),
                    dense: terms(&[("reward_move", 0.1)]),
                },
                anneal_frac: Some(0.5),
                conditional: None,
            },
            "humanoid" => Self {
                weights: ShapingWeights {
                    sparse: BTreeMap::new(),
                    dense: terms(&[
                        ("reward_linvel", 0.1),
                        ("reward_quadctrl", 0.1),
                        ("reward_alive", 0.1),
                        ("reward_impact", 0.1),
                    ]),
                },
                anneal_frac: None,
                conditional: None,
            },
            "humanoid_stand" => Self {
                weights: ShapingWeights {
                    sparse: BTreeMap::new(),
                    dense: terms(&[
                        ("reward_linvel", 0.0),
                        ("reward_quadctrl", 0.1),
                        ("reward_alive", 0.1),
                        ("reward_impact", 0.1),
                    ]),
                },
                anneal_frac: None,
                conditional: None,
            },
            _ => return None,
        };
        Some(config)
    }

    /// Annealer implied by the settings
    ///
    /// Conditional when a metric is configured, linear 1 -> 0 when an
    /// anneal fraction is given, otherwise a constant 0.5 blend.
    pub fn annealer(&self) -> Annealer {
        if let Some(cond) = &self.conditional {
            Annealer::Conditional(ConditionalAnnealer::new(cond.clone()))
        } else if let Some(frac) = self.anneal_frac {
            Annealer::linear(1.0, 0.0, frac)
        } else {
            Annealer::constant(0.5)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RewardType {
    Sparse,
    Dense,
}

/// Shaped reward of one agent for one step
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapedReward {
    /// Weighted sum of sparse terms
    pub sparse: f64,
    /// Weighted sum of dense terms
    pub dense: f64,
    /// Blended reward handed to the learner
    pub reward: f64,
    /// Blend weight used for this step
    pub dense_weight: f64,
}

/// Applies reward shaping to per-agent reward term maps
#[derive(Clone, Debug)]
pub struct RewardShaper {
    terms: FxHashMap<String, (RewardType, f64)>,
    annealer: AnnealerHandle,
}

impl RewardShaper {
    pub fn new(weights: &ShapingWeights, annealer: AnnealerHandle) -> Result<Self> {
        let mut terms = FxHashMap::default();
        for (term, weight) in &weights.sparse {
            terms.insert(term.clone(), (RewardType::Sparse, *weight));
        }
        for (term, weight) in &weights.dense {
            if terms.insert(term.clone(), (RewardType::Dense, *weight)).is_some() {
                return Err(PbtError::InvalidConfig(format!(
                    "reward term {} is both sparse and dense",
                    term
                )));
            }
        }
        Ok(Self { terms, annealer })
    }

    /// Shape one step; `infos[i]` holds the reward terms of agent `i`
    pub fn shape(&self, infos: &[BTreeMap<String, f64>]) -> Result<Vec<ShapedReward>> {
        let c = self.annealer.value()?;
        if !(0.0..=1.0).contains(&c) {
            return Err(PbtError::AnnealOutOfRange(c));
        }

        Ok(infos
            .iter()
            .map(|info| {
                let (sparse, dense) = self.weighted_sums(info);
                ShapedReward {
                    sparse,
                    dense,
                    reward: sparse * (1.0 - c) + dense * c,
                    dense_weight: c,
                }
            })
            .collect())
    }

    fn weighted_sums(&self, info: &BTreeMap<String, f64>) -> (f64, f64) {
        let mut sparse = 0.0;
        let mut dense = 0.0;
        for (term, value) in info {
            match self.terms.get(term) {
                Some((RewardType::Sparse, weight)) => sparse += weight * value,
                Some((RewardType::Dense, weight)) => dense += weight * value,
                None => {}
            }
        }
        (sparse, dense)
    }
}

/// Register the shaping annealer and build a shaper reading it
pub fn apply_reward_shaping(
    config: &RewardShapingConfig,
    scheduler: &Arc<AnnealScheduler>,
) -> Result<RewardShaper> {
    let annealer = config.annealer();
    tracing::info!("Reward shaping annealer: {:?}", annealer);
    scheduler.set_annealer(REWARD_SHAPING, annealer);
    RewardShaper::new(
        &config.weights,
        AnnealerHandle::new(Arc::clone(scheduler), REWARD_SHAPING),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_annealer_selection() {
        let default = RewardShapingConfig::default();
        assert_eq!(default.annealer(), Annealer::linear(1.0, 0.0, 0.5));

        let humanoid = RewardShapingConfig::preset("humanoid").unwrap();
        assert_eq!(humanoid.annealer(), Annealer::constant(0.5));

        let mut conditional = RewardShapingConfig::default();
        conditional.conditional = Some(ConditionalConfig::default());
        assert!(matches!(conditional.annealer(), Annealer::Conditional(_)));
    }

    #[test]
    fn test_unknown_preset() {
        assert!(RewardShapingConfig::preset("nope").is_none());
    }

    #[test]
    fn test_shape_blends_by_annealer() {
        let scheduler = AnnealScheduler::new();
        let shaper = apply_reward_shaping(&RewardShapingConfig::default(), &scheduler).unwrap();

        let infos = vec![info(&[("reward_move", 2.0), ("reward_remaining", 10.0)])];

        // Start of training: dense weight 1
        let shaped = shaper.shape(&infos).unwrap();
        assert!((shaped[0].dense - 0.2).abs() < 1e-9);
        assert!((shaped[0].sparse - 0.1).abs() < 1e-9);
        assert!((shaped[0].reward - 0.2).abs() < 1e-9);
        assert_eq!(shaped[0].dense_weight, 1.0);

        // Past the anneal window: sparse only
        scheduler.value(REWARD_SHAPING, 0.2).unwrap();
        let shaped = shaper.shape(&infos).unwrap();
        assert!((shaped[0].reward - 0.1).abs() < 1e-9);
        assert_eq!(shaped[0].dense_weight, 0.0);
    }

    #[test]
    fn test_shape_ignores_unknown_terms() {
        let scheduler = AnnealScheduler::new();
        let shaper = apply_reward_shaping(&RewardShapingConfig::default(), &scheduler).unwrap();

        let shaped = shaper.shape(&[info(&[("something_else", 5.0)])]).unwrap();
        assert_eq!(shaped[0].reward, 0.0);
    }

    #[test]
    fn test_shape_rejects_out_of_range_weight() {
        let scheduler = AnnealScheduler::new();
        scheduler.set_annealer(REWARD_SHAPING, Annealer::constant(1.5));
        let shaper = RewardShaper::new(
            &ShapingWeights::default(),
            AnnealerHandle::new(Arc::clone(&scheduler), REWARD_SHAPING),
        )
        .unwrap();

        assert!(matches!(
            shaper.shape(&[info(&[])]),
            Err(PbtError::AnnealOutOfRange(_))
        ));
    }

    #[test]
    fn test_term_in_both_groups_rejected() {
        let scheduler = AnnealScheduler::new();
        scheduler.set_annealer(REWARD_SHAPING, Annealer::constant(0.5));
        let weights = ShapingWeights {
            sparse: info(&[("r", 1.0)]),
            dense: info(&[("r", 1.0)]),
        };
        assert!(RewardShaper::new(&weights, AnnealerHandle::new(scheduler, REWARD_SHAPING)).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{"weights": {"dense": {"reward_move": 0.1}}, "anneal_frac": 0.25}"#;
        let config: RewardShapingConfig = serde_json::from_str(json).unwrap();
        assert!(config.weights.sparse.is_empty());
        assert_eq!(config.anneal_frac, Some(0.25));
    }
}
