//! Two-player zero-sum matrix games
//!
//! Level 4 - Game definitions

use pbt_core::{PbtError, Result};
use serde::{Deserialize, Serialize};

/// Payoff matrix from the row player's point of view
///
/// The column player receives the negated payoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrixGame")]
pub struct MatrixGame {
    pub name: String,
    payoff: Vec<Vec<f64>>,
}

/// Unchecked form read from JSON, validated through `MatrixGame::new`
#[derive(Deserialize)]
struct RawMatrixGame {
    name: String,
    payoff: Vec<Vec<f64>>,
}

impl TryFrom<RawMatrixGame> for MatrixGame {
    type Error = PbtError;

    fn try_from(raw: RawMatrixGame) -> Result<Self> {
        MatrixGame::new(raw.name, raw.payoff)
    }
}

impl MatrixGame {
    /// Build a game from a square or rectangular payoff matrix
    pub fn new(name: impl Into<String>, payoff: Vec<Vec<f64>>) -> Result<Self> {
        let cols = payoff.first().map_or(0, Vec::len);
        if payoff.is_empty() || cols == 0 {
            return Err(PbtError::InvalidConfig("payoff matrix is empty".to_string()));
        }
        if payoff.iter().any(|row| row.len() != cols) {
            return Err(PbtError::InvalidConfig("payoff rows differ in length".to_string()));
        }
        Ok(Self {
            name: name.into(),
            payoff,
        })
    }

    /// Named preset game
    pub fn preset(name: &str) -> Result<Self> {
        let payoff = match name {
            "rock_paper_scissors" => vec![
                vec![0.0, -1.0, 1.0],
                vec![1.0, 0.0, -1.0],
                vec![-1.0, 1.0, 0.0],
            ],
            "matching_pennies" => vec![vec![1.0, -1.0], vec![-1.0, 1.0]],
            // Rock-paper-scissors where pushing through with "rock" pays double
            "push" => vec![
                vec![0.0, -1.0, 2.0],
                vec![1.0, 0.0, -1.0],
                vec![-2.0, 1.0, 0.0],
            ],
            other => return Err(PbtError::InvalidConfig(format!("unknown game: {}", other))),
        };
        Self::new(name, payoff)
    }

    /// Actions available to the row player
    pub fn row_actions(&self) -> usize {
        self.payoff.len()
    }

    /// Actions available to the column player
    pub fn col_actions(&self) -> usize {
        self.payoff[0].len()
    }

    /// Largest action count of either side, the policy logit size
    pub fn num_actions(&self) -> usize {
        self.row_actions().max(self.col_actions())
    }

    /// Row player's payoff for one joint action
    pub fn payoff(&self, row: usize, col: usize) -> f64 {
        self.payoff[row][col]
    }
}
