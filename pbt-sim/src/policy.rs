//! Softmax policies over flat logit vectors
//!
//! Level 3 - Steps

use pbt_core::{PbtError, PolicyWeights, Result};
use rand::Rng;

/// Action probabilities of a policy restricted to the first `num_actions` logits
pub fn action_probs(weights: &PolicyWeights, num_actions: usize) -> Result<Vec<f64>> {
    if weights.len() < num_actions || num_actions == 0 {
        return Err(PbtError::InvalidConfig(format!(
            "policy has {} logits, game needs {}",
            weights.len(),
            num_actions
        )));
    }

    let logits = &weights.values[..num_actions];
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Sample an action index from a probability vector
pub fn sample_action<R: Rng>(probs: &[f64], rng: &mut R) -> usize {
    let mut roll: f64 = rng.gen();
    for (action, &p) in probs.iter().enumerate() {
        if roll < p {
            return action;
        }
        roll -= p;
    }
    probs.len().saturating_sub(1)
}

/// Accumulates REINFORCE gradients for one policy
#[derive(Clone, Debug)]
pub struct PolicyGradient {
    grad: Vec<f64>,
    samples: usize,
}

impl PolicyGradient {
    pub fn new(num_logits: usize) -> Self {
        Self {
            grad: vec![0.0; num_logits],
            samples: 0,
        }
    }

    /// Add `advantage * d log pi(action) / d logits`
    pub fn add(&mut self, probs: &[f64], action: usize, advantage: f64) {
        for (i, &p) in probs.iter().enumerate() {
            let indicator = if i == action { 1.0 } else { 0.0 };
            self.grad[i] += advantage * (indicator - p);
        }
        self.samples += 1;
    }

    /// Gradient ascent step with the averaged gradient
    pub fn apply(&self, weights: &mut PolicyWeights, lr: f64) {
        if self.samples == 0 {
            return;
        }
        let scale = lr / self.samples as f64;
        for (w, g) in weights.values.iter_mut().zip(&self.grad) {
            *w += (scale * g) as f32;
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }
}
