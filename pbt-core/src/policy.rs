//! Policy identifiers and weights

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Policy id of the agent being trained and evaluated
pub const MAIN_POLICY: &str = "main";

/// Policy id under which evaluation opponents are installed on workers
pub const EVAL_OPPONENT: &str = "eval_op";

/// Name of a policy inside a trainer or worker
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The `main` policy
    pub fn main() -> Self {
        Self::new(MAIN_POLICY)
    }

    /// The `eval_op` slot used during evaluation
    pub fn eval_opponent() -> Self {
        Self::new(EVAL_OPPONENT)
    }

    /// `policy_<index>`, the per-agent naming used by two-policy setups
    pub fn for_agent(index: usize) -> Self {
        Self(format!("policy_{}", index))
    }

    /// `op_<index>`, the naming used for population members
    pub fn opponent(index: usize) -> Self {
        Self(format!("op_{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PolicyId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PolicyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PolicyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Flat parameter vector of a policy
///
/// The layout is owned by whoever trains the policy; this crate only moves
/// weights between trainers, workers and checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    pub values: Vec<f32>,
}

impl PolicyWeights {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// All-zero weights of the given size
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Weights keyed by policy id, as passed to `set_weights`
pub type WeightMap = BTreeMap<PolicyId, PolicyWeights>;

/// One member of an opponent pool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Opponent {
    /// Name the opponent had when it was trained
    pub id: PolicyId,
    pub weights: PolicyWeights,
}

impl Opponent {
    pub fn new(id: impl Into<PolicyId>, weights: PolicyWeights) -> Self {
        Self {
            id: id.into(),
            weights,
        }
    }

    /// Weight map that installs this opponent into the `eval_op` slot
    pub fn as_eval_weights(&self) -> WeightMap {
        let mut map = WeightMap::new();
        map.insert(PolicyId::eval_opponent(), self.weights.clone());
        map
    }
}
