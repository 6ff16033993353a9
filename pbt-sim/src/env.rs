//! Repeated matrix game duel
//!
//! Level 3 - Step-level implementation
//!
//! Two agents play `horizon` simultaneous moves. Every step reports two
//! reward terms per agent: `reward_move`, the payoff of the joint action
//! (dense), and `reward_remaining`, which is zero until the final step and
//! then +1/-1/0 for winning/losing/drawing on cumulative payoff (sparse).

use std::collections::BTreeMap;

use pbt_core::{PbtError, PolicyWeights, Result};
use pbt_schedule::RewardShaper;
use rand::Rng;

use crate::game::MatrixGame;
use crate::policy::{action_probs, sample_action};

/// Dense per-step payoff term
pub const REWARD_MOVE: &str = "reward_move";

/// Sparse end-of-episode outcome term
pub const REWARD_REMAINING: &str = "reward_remaining";

/// One simultaneous move
#[derive(Clone, Debug)]
pub struct DuelStep {
    /// Actions of agent 0 (row) and agent 1 (column)
    pub actions: [usize; 2],
    /// Action distributions the agents sampled from
    pub probs: [Vec<f64>; 2],
    /// Reward terms per agent
    pub infos: [BTreeMap<String, f64>; 2],
}

/// A finished duel
#[derive(Clone, Debug, Default)]
pub struct DuelEpisode {
    pub steps: Vec<DuelStep>,
}

/// Per-agent returns of an episode
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DuelReturns {
    pub returns: [f64; 2],
    /// Blend weight used by the shaper, if one was applied
    pub dense_weight: Option<f64>,
}

impl DuelEpisode {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total reward per agent, shaped when a shaper is given
    ///
    /// Without a shaper every reward term counts with weight 1.
    pub fn returns(&self, shaper: Option<&RewardShaper>) -> Result<DuelReturns> {
        let mut out = DuelReturns::default();
        for step in &self.steps {
            match shaper {
                Some(shaper) => {
                    let shaped = shaper.shape(&step.infos)?;
                    for (agent, reward) in shaped.iter().enumerate() {
                        out.returns[agent] += reward.reward;
                    }
                    out.dense_weight = shaped.first().map(|r| r.dense_weight);
                }
                None => {
                    for (agent, info) in step.infos.iter().enumerate() {
                        out.returns[agent] += info.values().sum::<f64>();
                    }
                }
            }
        }
        Ok(out)
    }

    /// Cumulative game payoff of the row agent
    pub fn row_payoff(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.infos[0].get(REWARD_MOVE).copied().unwrap_or(0.0))
            .sum()
    }
}

/// Environment playing a matrix game for a fixed number of moves
#[derive(Clone, Debug)]
pub struct DuelEnv {
    game: MatrixGame,
    horizon: u32,
}

impl DuelEnv {
    pub fn new(game: MatrixGame, horizon: u32) -> Result<Self> {
        if horizon == 0 {
            return Err(PbtError::InvalidConfig("horizon must be positive".to_string()));
        }
        Ok(Self { game, horizon })
    }

    pub fn game(&self) -> &MatrixGame {
        &self.game
    }

    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    /// Play one episode between a row and a column policy
    pub fn play<R: Rng>(
        &self,
        row: &PolicyWeights,
        col: &PolicyWeights,
        rng: &mut R,
    ) -> Result<DuelEpisode> {
        let row_probs = action_probs(row, self.game.row_actions())?;
        let col_probs = action_probs(col, self.game.col_actions())?;

        let mut steps = Vec::with_capacity(self.horizon as usize);
        let mut cumulative = 0.0;
        for t in 0..self.horizon {
            let actions = [sample_action(&row_probs, rng), sample_action(&col_probs, rng)];
            let payoff = self.game.payoff(actions[0], actions[1]);
            cumulative += payoff;

            let outcome = if t + 1 == self.horizon {
                outcome_sign(cumulative)
            } else {
                0.0
            };
            steps.push(DuelStep {
                actions,
                probs: [row_probs.clone(), col_probs.clone()],
                infos: [step_info(payoff, outcome), step_info(-payoff, -outcome)],
            });
        }

        Ok(DuelEpisode { steps })
    }
}

fn step_info(reward_move: f64, reward_remaining: f64) -> BTreeMap<String, f64> {
    let mut info = BTreeMap::new();
    info.insert(REWARD_MOVE.to_string(), reward_move);
    info.insert(REWARD_REMAINING.to_string(), reward_remaining);
    info
}

fn outcome_sign(cumulative: f64) -> f64 {
    if cumulative > 0.0 {
        1.0
    } else if cumulative < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbt_schedule::{apply_reward_shaping, AnnealScheduler, RewardShapingConfig};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Logits that make a policy nearly always pick `action`
    fn pure(action: usize, n: usize) -> PolicyWeights {
        let mut values = vec![-50.0; n];
        values[action] = 50.0;
        PolicyWeights::new(values)
    }

    fn rps_env(horizon: u32) -> DuelEnv {
        DuelEnv::new(MatrixGame::preset("rock_paper_scissors").unwrap(), horizon).unwrap()
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let game = MatrixGame::preset("matching_pennies").unwrap();
        assert!(DuelEnv::new(game, 0).is_err());
    }

    #[test]
    fn test_play_rewards() {
        let env = rps_env(4);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        // Rock against scissors every move
        let episode = env.play(&pure(0, 3), &pure(2, 3), &mut rng).unwrap();

        assert_eq!(episode.len(), 4);
        assert_eq!(episode.row_payoff(), 4.0);
        let last = &episode.steps[3];
        assert_eq!(last.infos[0][REWARD_REMAINING], 1.0);
        assert_eq!(last.infos[1][REWARD_REMAINING], -1.0);
        assert_eq!(episode.steps[0].infos[0][REWARD_REMAINING], 0.0);

        let returns = episode.returns(None).unwrap();
        assert_eq!(returns.returns, [5.0, -5.0]);
        assert!(returns.dense_weight.is_none());
    }

    #[test]
    fn test_draw_outcome() {
        let env = rps_env(3);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let episode = env.play(&pure(1, 3), &pure(1, 3), &mut rng).unwrap();
        assert_eq!(episode.steps[2].infos[0][REWARD_REMAINING], 0.0);
        assert_eq!(episode.returns(None).unwrap().returns, [0.0, 0.0]);
    }

    #[test]
    fn test_shaped_returns() {
        let env = rps_env(2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let episode = env.play(&pure(0, 3), &pure(2, 3), &mut rng).unwrap();

        let scheduler = AnnealScheduler::new();
        let shaper = apply_reward_shaping(&RewardShapingConfig::default(), &scheduler).unwrap();

        // Dense weight 1 at the start: only reward_move * 0.1 counts
        let returns = episode.returns(Some(&shaper)).unwrap();
        assert!((returns.returns[0] - 0.2).abs() < 1e-9);
        assert_eq!(returns.dense_weight, Some(1.0));
    }

    #[test]
    fn test_policy_too_small() {
        let env = rps_env(1);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(env.play(&PolicyWeights::zeros(2), &pure(0, 3), &mut rng).is_err());
    }
}
