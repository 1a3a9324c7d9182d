#![forbid(unsafe_code)]

pub mod active_set;
pub mod base;
pub mod direct;
pub mod equality;
pub mod error;
pub mod iterative;
pub mod lp;
pub mod strategy;
pub mod unconstrained;
pub mod working_set;

pub use active_set::ActiveSetSolver;
pub use base::{QpIteration, SolverBase};
pub use direct::DirectStrategy;
pub use equality::EqualitySolver;
pub use error::SolverError;
pub use iterative::{IterativeStrategy, RowKey};
pub use lp::{find_feasible_point, LpOutcome};
pub use strategy::{IterationSolve, IterationStrategy, PathChain, SolvePath};
pub use unconstrained::UnconstrainedSolver;
pub use working_set::WorkingSet;

use activeqp_core::options::SolveOptions;
use activeqp_core::problem::Problem;
use activeqp_core::solution::Solution;

/// Solver chosen once from the constraint counts.
pub enum QpSolver<'a> {
    Unconstrained(UnconstrainedSolver<'a>),
    Equality(EqualitySolver<'a>),
    ActiveSet(ActiveSetSolver<'a>),
}

impl<'a> QpSolver<'a> {
    pub fn new(problem: &'a Problem, options: SolveOptions) -> Self {
        match (problem.equality_count(), problem.inequality_count()) {
            (0, 0) => QpSolver::Unconstrained(UnconstrainedSolver::new(problem, options)),
            (_, 0) => QpSolver::Equality(EqualitySolver::new(problem, options)),
            _ => QpSolver::ActiveSet(ActiveSetSolver::new(problem, options)),
        }
    }

    pub fn solve(&mut self, kick_starter: Option<&Solution>) -> Result<Solution, SolverError> {
        match self {
            QpSolver::Unconstrained(solver) => solver.solve(kick_starter),
            QpSolver::Equality(solver) => solver.solve(kick_starter),
            QpSolver::ActiveSet(solver) => solver.solve(kick_starter),
        }
    }
}
