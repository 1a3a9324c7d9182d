use crate::math::Scalar;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the active-set loop decided at the end of an iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IterationAction {
    Solved,
    Included(usize),
    Excluded(usize),
    /// Dropped after a rank-deficient solve.
    Shrunk(usize),
    Stalled,
    Converged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub objective: Scalar,
    pub step_length: Scalar,
    pub included: usize,
    pub action: IterationAction,
    pub elapsed: Duration,
}

impl IterationRecord {
    pub fn new(
        iteration: usize,
        objective: Scalar,
        step_length: Scalar,
        included: usize,
        action: IterationAction,
        elapsed: Duration,
    ) -> Self {
        Self {
            iteration,
            objective,
            step_length,
            included,
            action,
            elapsed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveStats {
    pub history: Vec<IterationRecord>,
    pub solve_time: Duration,
    pub factorizations: usize,
    pub linear_solves: usize,
}

impl SolveStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: IterationRecord) {
        self.history.push(record);
    }

    pub fn objectives(&self) -> impl Iterator<Item = Scalar> + '_ {
        self.history.iter().map(|record| record.objective)
    }
}
