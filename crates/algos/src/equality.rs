use crate::base::{QpIteration, SolverBase};
use crate::direct::DirectStrategy;
use crate::strategy::PathChain;
use activeqp_core::options::SolveOptions;
use activeqp_core::problem::Problem;
use activeqp_core::solution::{Solution, State};
use activeqp_core::stats::IterationAction;
use tracing::{debug, warn};

/// One-shot solve of the KKT system for the equality constraints.
/// Inequalities, if the problem has any, are ignored.
pub struct EqualitySolver<'a> {
    base: SolverBase<'a>,
}

impl<'a> EqualitySolver<'a> {
    pub fn new(problem: &'a Problem, options: SolveOptions) -> Self {
        Self {
            base: SolverBase::new(problem, options),
        }
    }
}

impl<'a> QpIteration<'a> for EqualitySolver<'a> {
    fn base(&self) -> &SolverBase<'a> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SolverBase<'a> {
        &mut self.base
    }

    fn initialise(&mut self, _kick_starter: Option<&Solution>) -> bool {
        true
    }

    fn perform_iteration(&mut self) {
        let chain = PathChain::for_factor(self.base.chol());
        let solved = chain.solve(&mut DirectStrategy, &mut self.base, &[]);
        let base = &mut self.base;
        match solved {
            Some(solution) if solution.path.is_exact() => {
                let m_eq = base.problem().equality_count();
                *base.x_mut() = solution.x;
                base.multipliers_mut()
                    .rows_mut(0, m_eq)
                    .copy_from(&solution.multipliers.rows(0, m_eq));
                let state = if base.chol().is_spd() {
                    State::Distinct
                } else {
                    State::Optimal
                };
                base.set_state(state);
            }
            Some(solution) => {
                debug!(path = ?solution.path, "only an inexact solve succeeded");
                warn!("objective is unbounded on the equality constraints");
                base.fail(State::Unbounded);
            }
            None => {
                let rows = base.problem().equality_count();
                let rank = base.equality_rank();
                if rank < rows {
                    warn!(rank, rows, "equality system is rank deficient");
                    base.fail(State::Infeasible);
                } else {
                    warn!("objective is unbounded on the equality constraints");
                    base.fail(State::Unbounded);
                }
            }
        }
        base.record(1.0, 0, IterationAction::Solved);
    }

    fn needs_another_iteration(&mut self) -> bool {
        false
    }
}
