//! Opponent selection for population training
//!
//! Each training episode the main agent faces one member of the population.
//! These schedulers decide which one, given what the trainer knows about the
//! population.

use pbt_core::{PbtError, PolicyId, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// What the trainer knows about the opponent population
#[derive(Clone, Debug, Default)]
pub struct AgentInfos {
    /// Population size
    pub num_agents: usize,
    /// `deactivated[i]` is true when agent `i` must not be scheduled
    pub deactivated: Vec<bool>,
    /// Policies eligible as opponents
    pub opponent_policies: Vec<PolicyId>,
}

impl AgentInfos {
    /// Population of `num_agents` active opponents named `op_<i>`
    pub fn population(num_agents: usize) -> Self {
        Self {
            num_agents,
            deactivated: vec![false; num_agents],
            opponent_policies: (0..num_agents).map(PolicyId::opponent).collect(),
        }
    }

    /// Mark an agent as (in)active
    pub fn set_active(&mut self, index: usize, active: bool) {
        if index >= self.deactivated.len() {
            self.deactivated.resize(index + 1, false);
        }
        self.deactivated[index] = !active;
    }

    /// Indices that may be scheduled
    pub fn active_indices(&self) -> Vec<usize> {
        (0..self.num_agents)
            .filter(|&i| !self.deactivated.get(i).copied().unwrap_or(false))
            .collect()
    }
}

/// Pick any agent index uniformly
pub fn random_scheduler<R: Rng>(infos: &AgentInfos, rng: &mut R) -> Result<usize> {
    if infos.num_agents == 0 {
        return Err(PbtError::EmptyChoice("population has no agents"));
    }
    Ok(rng.gen_range(0..infos.num_agents))
}

/// Pick uniformly among agents that are not deactivated
pub fn random_choice_scheduler<R: Rng>(infos: &AgentInfos, rng: &mut R) -> Result<usize> {
    infos
        .active_indices()
        .choose(rng)
        .copied()
        .ok_or(PbtError::EmptyChoice("every agent is deactivated"))
}

/// Pick one of the opponent policies uniformly
pub fn random_policy_scheduler<R: Rng>(infos: &AgentInfos, rng: &mut R) -> Result<PolicyId> {
    infos
        .opponent_policies
        .choose(rng)
        .cloned()
        .ok_or(PbtError::EmptyChoice("no opponent policies"))
}

/// Result of a scheduling decision
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduledOpponent {
    /// Index into the population
    Index(usize),
    /// A policy picked directly
    Policy(PolicyId),
}

impl ScheduledOpponent {
    /// Resolve to a policy id, mapping indices through `opponent_policies`
    pub fn policy(&self, infos: &AgentInfos) -> Result<PolicyId> {
        match self {
            ScheduledOpponent::Policy(id) => Ok(id.clone()),
            ScheduledOpponent::Index(i) => infos
                .opponent_policies
                .get(*i)
                .cloned()
                .ok_or_else(|| PbtError::UnknownPolicy(format!("opponent index {}", i))),
        }
    }
}

/// Opponent scheduling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentScheduler {
    /// Uniform over the whole population
    Random,
    /// Uniform over agents that are still active
    #[default]
    RandomActive,
    /// Uniform over the opponent policy list
    RandomPolicy,
}

impl OpponentScheduler {
    /// Make one scheduling decision
    pub fn select<R: Rng>(&self, infos: &AgentInfos, rng: &mut R) -> Result<ScheduledOpponent> {
        match self {
            OpponentScheduler::Random => random_scheduler(infos, rng).map(ScheduledOpponent::Index),
            OpponentScheduler::RandomActive => {
                random_choice_scheduler(infos, rng).map(ScheduledOpponent::Index)
            }
            OpponentScheduler::RandomPolicy => {
                random_policy_scheduler(infos, rng).map(ScheduledOpponent::Policy)
            }
        }
    }

    /// Make one decision and resolve it to a policy id
    pub fn select_policy<R: Rng>(&self, infos: &AgentInfos, rng: &mut R) -> Result<PolicyId> {
        self.select(infos, rng)?.policy(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_random_scheduler_covers_population() {
        let infos = AgentInfos::population(4);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut seen = [false; 4];

        for _ in 0..200 {
            let idx = random_scheduler(&infos, &mut rng).unwrap();
            assert!(idx < 4);
            seen[idx] = true;
        }

        assert!(seen.iter().all(|&s| s), "Every agent should be picked eventually");
    }

    #[test]
    fn test_random_scheduler_empty_population() {
        let infos = AgentInfos::population(0);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(matches!(
            random_scheduler(&infos, &mut rng),
            Err(PbtError::EmptyChoice(_))
        ));
    }

    #[test]
    fn test_random_choice_skips_deactivated() {
        let mut infos = AgentInfos::population(5);
        infos.set_active(0, false);
        infos.set_active(2, false);
        infos.set_active(4, false);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..100 {
            let idx = random_choice_scheduler(&infos, &mut rng).unwrap();
            assert!(idx == 1 || idx == 3, "Picked deactivated agent {}", idx);
        }
    }

    #[test]
    fn test_random_choice_all_deactivated() {
        let mut infos = AgentInfos::population(2);
        infos.set_active(0, false);
        infos.set_active(1, false);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert!(random_choice_scheduler(&infos, &mut rng).is_err());
    }

    #[test]
    fn test_random_policy_scheduler() {
        let infos = AgentInfos {
            num_agents: 0,
            deactivated: vec![],
            opponent_policies: vec![PolicyId::new("a"), PolicyId::new("b")],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let picked = random_policy_scheduler(&infos, &mut rng).unwrap();
        assert!(picked.as_str() == "a" || picked.as_str() == "b");
    }

    #[test]
    fn test_scheduler_resolves_index_to_policy() {
        let infos = AgentInfos::population(3);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let policy = OpponentScheduler::RandomActive
            .select_policy(&infos, &mut rng)
            .unwrap();
        assert!(infos.opponent_policies.contains(&policy));
    }

    #[test]
    fn test_scheduler_deserializes_snake_case() {
        let kind: OpponentScheduler = serde_json::from_str("\"random_policy\"").unwrap();
        assert_eq!(kind, OpponentScheduler::RandomPolicy);
    }
}
