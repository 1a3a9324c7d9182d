use crate::math::Scalar;
use crate::stats::SolveStats;
use serde::{Deserialize, Serialize};

/// Solver state. Validation sets `Valid`/`Invalid`, the feasibility search
/// sets `Feasible`/`Infeasible`, and the solve loop ends in one of the
/// terminal states.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum State {
    #[default]
    Unexplored,
    Valid,
    Invalid,
    Feasible,
    Infeasible,
    /// Optimal, and the minimizer is unique.
    Distinct,
    Optimal,
    Unbounded,
    Failed,
}

impl State {
    pub fn is_optimal(self) -> bool {
        matches!(self, State::Optimal | State::Distinct)
    }

    pub fn is_feasible(self) -> bool {
        matches!(self, State::Feasible | State::Optimal | State::Distinct)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            State::Invalid | State::Infeasible | State::Unbounded | State::Failed
        )
    }
}

/// Result of a solve. `state` is authoritative: check it before trusting
/// `primal` or `multipliers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub state: State,
    pub primal: Vec<Scalar>,
    /// Equality multipliers first, then one entry per inequality in its
    /// original order (zero for constraints that ended up excluded).
    pub multipliers: Vec<Scalar>,
    pub objective_value: Scalar,
    pub iterations: usize,
    pub stats: SolveStats,
}

impl Solution {
    /// Seed for a later solve of a problem with the same shape.
    pub fn feasible_start(primal: Vec<Scalar>) -> Self {
        Self {
            state: State::Feasible,
            multipliers: Vec::new(),
            iterations: 0,
            objective_value: 0.0,
            stats: SolveStats::new(),
            primal,
        }
    }

    pub fn equality_multipliers(&self, meq: usize) -> &[Scalar] {
        &self.multipliers[..meq.min(self.multipliers.len())]
    }

    pub fn inequality_multipliers(&self, meq: usize) -> &[Scalar] {
        &self.multipliers[meq.min(self.multipliers.len())..]
    }
}
