//! Agent to policy mapping for two-sided episodes

use pbt_core::{PbtError, PolicyId, Result};
use rand::seq::SliceRandom;
use rand::Rng;

/// Maps the main agent to the main policy and everyone else to a random opponent
#[derive(Clone, Debug)]
pub struct PolicyMapping {
    main_agent: usize,
    main_policy: PolicyId,
    opponents: Vec<PolicyId>,
}

impl PolicyMapping {
    pub fn new(main_agent: usize, main_policy: PolicyId, opponents: Vec<PolicyId>) -> Result<Self> {
        if opponents.is_empty() {
            return Err(PbtError::EmptyChoice("policy mapping needs at least one opponent"));
        }
        Ok(Self {
            main_agent,
            main_policy,
            opponents,
        })
    }

    /// Policy that controls `agent` in the next episode
    pub fn map<R: Rng>(&self, agent: usize, rng: &mut R) -> PolicyId {
        if agent == self.main_agent {
            return self.main_policy.clone();
        }
        // Non-empty by construction
        self.opponents
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| self.main_policy.clone())
    }

    pub fn main_agent(&self) -> usize {
        self.main_agent
    }

    pub fn opponents(&self) -> &[PolicyId] {
        &self.opponents
    }
}
