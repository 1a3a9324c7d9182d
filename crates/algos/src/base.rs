use crate::error::SolverError;
use activeqp_core::math::{Scalar, Timer};
use activeqp_core::options::SolveOptions;
use activeqp_core::problem::Problem;
use activeqp_core::solution::{Solution, State};
use activeqp_core::stats::{IterationAction, IterationRecord, SolveStats};
use activeqp_linsys::{min_eigenvalue, numerical_rank, CholeskyFactor};
use nalgebra::DVector;
use tracing::{debug, error, info, warn, Level};

/// State shared by every solver: the problem, the cached factorization of
/// Q, the primal/dual buffers and the iteration bookkeeping.
///
/// The buffers are allocated once here and overwritten in place.
pub struct SolverBase<'a> {
    problem: &'a Problem,
    options: SolveOptions,
    chol: CholeskyFactor,
    x: DVector<Scalar>,
    multipliers: DVector<Scalar>,
    state: State,
    iterations: usize,
    stats: SolveStats,
    timer: Timer,
}

impl<'a> SolverBase<'a> {
    pub fn new(problem: &'a Problem, options: SolveOptions) -> Self {
        let chol = CholeskyFactor::new(options.accuracy_tolerance);
        Self {
            x: DVector::zeros(problem.n()),
            multipliers: DVector::zeros(problem.equality_count() + problem.inequality_count()),
            problem,
            options,
            chol,
            state: State::Unexplored,
            iterations: 0,
            stats: SolveStats::new(),
            timer: Timer::start(),
        }
    }

    pub fn problem(&self) -> &'a Problem {
        self.problem
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    pub fn chol(&self) -> &CholeskyFactor {
        &self.chol
    }

    pub fn x(&self) -> &DVector<Scalar> {
        &self.x
    }

    pub fn x_mut(&mut self) -> &mut DVector<Scalar> {
        &mut self.x
    }

    pub fn multipliers(&self) -> &DVector<Scalar> {
        &self.multipliers
    }

    pub fn multipliers_mut(&mut self) -> &mut DVector<Scalar> {
        &mut self.multipliers
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn stats_mut(&mut self) -> &mut SolveStats {
        &mut self.stats
    }

    /// Ends the solve in a failure state: primal and dual are zeroed.
    pub fn fail(&mut self, state: State) {
        debug_assert!(state.is_failure());
        self.state = state;
        self.x.fill(0.0);
        self.multipliers.fill(0.0);
    }

    /// Checks Q and factorizes it (with a diagonal perturbation if needed).
    pub fn validate(&mut self) -> Result<(), SolverError> {
        self.timer = Timer::start();
        self.iterations = 0;
        self.state = State::Valid;
        let strict = self.options.validate;
        let diagnose = strict || tracing::enabled!(Level::DEBUG);

        let asymmetry = self.problem.asymmetry();
        if asymmetry > self.options.symmetry_tolerance {
            self.state = State::Invalid;
            if strict {
                return Err(SolverError::AsymmetricQuadratic { asymmetry });
            }
            warn!(asymmetry, "quadratic matrix was not symmetric, using (Q + Qᵗ)/2");
        }

        let q = self.problem.q();
        if let Err(err) = self.chol.factor_with_fallback(q, self.options.perturbation) {
            warn!(%err, "quadratic matrix could not be factorized");
        }
        self.stats.factorizations += 1;

        if diagnose && !self.chol.is_spd() {
            let min_eigenvalue = min_eigenvalue(q);
            let threshold = -self.options.feasibility_tolerance
                * activeqp_core::math::max_abs_diagonal(q).max(1.0);
            if min_eigenvalue < threshold {
                self.state = State::Invalid;
                if strict {
                    return Err(SolverError::NotPositiveSemidefinite { min_eigenvalue });
                }
                warn!(min_eigenvalue, "quadratic matrix is not positive semidefinite");
            }
        }

        let rows = self.problem.equality_count();
        if diagnose && rows > 0 {
            let rank = self.equality_rank();
            if rank < rows {
                if strict {
                    return Err(SolverError::RankDeficientEqualities { rank, rows });
                }
                warn!(rank, rows, "equality constraints are not of full row rank");
            }
        }
        Ok(())
    }

    pub fn equality_rank(&self) -> usize {
        numerical_rank(self.problem.ae(), self.options.accuracy_tolerance)
    }

    pub fn iteration_allowed(&self) -> bool {
        if self.iterations >= self.options.max_iterations {
            return false;
        }
        match self.options.max_time {
            Some(limit) => self.timer.elapsed() < limit,
            None => true,
        }
    }

    pub fn objective_value(&self) -> Scalar {
        self.problem.objective_value(&self.x)
    }

    pub fn is_feasible(&self, x: &DVector<Scalar>) -> bool {
        self.problem.max_violation(x) <= self.feasibility_threshold()
    }

    pub fn feasibility_threshold(&self) -> Scalar {
        self.options.feasibility_tolerance * self.problem.rhs_scale()
    }

    pub fn record(&mut self, step_length: Scalar, included: usize, action: IterationAction) {
        let record = IterationRecord::new(
            self.iterations,
            self.objective_value(),
            step_length,
            included,
            action,
            self.timer.elapsed(),
        );
        self.stats.push(record);
    }

    /// Rewrites the action of the latest iteration record.
    pub fn amend_action(&mut self, action: IterationAction) {
        if let Some(record) = self.stats.history.last_mut() {
            record.action = action;
        }
    }

    /// Verifies the final iterate when validation or debug logging is on.
    pub fn check_feasibility(&self) -> Result<(), SolverError> {
        if !self.state.is_feasible() {
            return Ok(());
        }
        if !(self.options.validate || tracing::enabled!(Level::DEBUG)) {
            return Ok(());
        }
        let violation = self.problem.max_violation(&self.x);
        if violation > self.feasibility_threshold() {
            error!(violation, state = ?self.state, "solution violates the constraints");
            if self.options.validate {
                return Err(SolverError::InfeasibleIterate { violation });
            }
        }
        Ok(())
    }

    fn into_solution(&mut self) -> Solution {
        self.timer.stop();
        let mut stats = std::mem::take(&mut self.stats);
        stats.solve_time = self.timer.elapsed();
        Solution {
            state: self.state,
            primal: self.x.iter().copied().collect(),
            multipliers: self.multipliers.iter().copied().collect(),
            objective_value: self.objective_value(),
            iterations: self.iterations,
            stats,
        }
    }
}

/// The solve loop shared by every solver:
///
/// ```text
///     validate → initialise → do { perform_iteration } while allowed && needed → finalise
/// ```
pub trait QpIteration<'a> {
    fn base(&self) -> &SolverBase<'a>;

    fn base_mut(&mut self) -> &mut SolverBase<'a>;

    /// Prepares the first iterate. Returns false when there is nothing to iterate on.
    fn initialise(&mut self, kick_starter: Option<&Solution>) -> bool;

    fn perform_iteration(&mut self);

    fn needs_another_iteration(&mut self) -> bool;

    /// Settles the state after the loop has stopped.
    fn finalise(&mut self) {}

    fn solve(&mut self, kick_starter: Option<&Solution>) -> Result<Solution, SolverError> {
        let problem = self.base().problem();
        info!(
            n = problem.n(),
            equalities = problem.equality_count(),
            inequalities = problem.inequality_count(),
            strategy = ?self.base().options().strategy,
            "solve started"
        );
        self.base_mut().validate()?;
        if self.initialise(kick_starter) {
            loop {
                self.base_mut().iterations += 1;
                self.perform_iteration();
                if !(self.base().iteration_allowed() && self.needs_another_iteration()) {
                    break;
                }
            }
        }
        self.finalise();
        self.base().check_feasibility()?;
        let solution = self.base_mut().into_solution();
        info!(
            state = ?solution.state,
            iterations = solution.iterations,
            objective = solution.objective_value,
            "solve finished"
        );
        debug!(factorizations = solution.stats.factorizations, "solve statistics");
        Ok(solution)
    }
}
