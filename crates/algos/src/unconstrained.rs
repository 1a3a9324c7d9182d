use crate::base::{QpIteration, SolverBase};
use activeqp_core::options::SolveOptions;
use activeqp_core::problem::Problem;
use activeqp_core::solution::{Solution, State};
use activeqp_core::stats::IterationAction;
use activeqp_core::traits::Factorization;
use activeqp_linsys::LuFactor;
use tracing::{debug, warn};

/// Minimizes ½xᵗQx − cᵗx without constraints by solving Qx = c once.
pub struct UnconstrainedSolver<'a> {
    base: SolverBase<'a>,
}

impl<'a> UnconstrainedSolver<'a> {
    pub fn new(problem: &'a Problem, options: SolveOptions) -> Self {
        Self {
            base: SolverBase::new(problem, options),
        }
    }
}

impl<'a> QpIteration<'a> for UnconstrainedSolver<'a> {
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
        let base = &mut self.base;
        let problem = base.problem();
        let mut solved = None;

        if base.chol().is_spd() {
            base.stats_mut().linear_solves += 1;
            match base.chol().solve_vector(problem.c()) {
                Ok(x) => solved = Some((x, State::Distinct)),
                Err(err) => debug!(%err, "cholesky solve failed"),
            }
        }
        if solved.is_none() {
            let mut lu = LuFactor::new(base.options().accuracy_tolerance);
            base.stats_mut().factorizations += 1;
            base.stats_mut().linear_solves += 1;
            match lu.factor(problem.q()).and_then(|()| lu.solve_vector(problem.c())) {
                Ok(x) => solved = Some((x, State::Optimal)),
                Err(err) => debug!(%err, "general factorization of Q failed"),
            }
        }

        match solved {
            Some((x, state)) => {
                *base.x_mut() = x;
                base.set_state(state);
            }
            None => {
                warn!("quadratic matrix is singular, objective is unbounded");
                base.fail(State::Unbounded);
            }
        }
        base.record(1.0, 0, IterationAction::Solved);
    }

    fn needs_another_iteration(&mut self) -> bool {
        false
    }
}
