//! Primal active-set method for
//!
//! ```text
//!     minimize    ½xᵗQx − cᵗx
//!     subject to  AE·x  = bE
//!                 AI·x <= bI
//! ```
//!
//! Every iteration solves the equality-constrained problem given by the
//! equalities and the included inequalities, then either moves towards its
//! minimizer until an excluded constraint blocks the step (and includes it),
//! or, once the minimizer is reached, drops the included constraint with the
//! most negative multiplier. The iterate stays feasible throughout.

use crate::base::{QpIteration, SolverBase};
use crate::lp::{find_feasible_point, LpOutcome};
use crate::strategy::{IterationSolution, IterationStrategy, PathChain};
use crate::working_set::WorkingSet;
use activeqp_core::math::{max_abs_diagonal, row_cosine, row_dot, row_norm, Scalar};
use activeqp_core::options::SolveOptions;
use activeqp_core::problem::Problem;
use activeqp_core::solution::{Solution, State};
use activeqp_core::stats::IterationAction;
use itertools::Itertools;
use nalgebra::DVector;
use std::cmp::Ordering;
use tracing::{debug, info, trace, warn};

/// Rows whose cosine exceeds this are considered duplicates when seeding.
const PARALLEL_COSINE: Scalar = 1.0 - 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// An excluded constraint cut the step short.
    Blocked(usize),
    /// The minimizer of the current working set was reached.
    Complete,
    /// Zero step blocked by the constraint excluded last; no move was made.
    Stalled,
    /// Every solve path failed and an included constraint was dropped.
    Shrunk,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShrinkRule {
    Multiplier,
    Parallel,
}

pub struct ActiveSetSolver<'a> {
    base: SolverBase<'a>,
    strategy: IterationStrategy,
    working: WorkingSet,
    chain: PathChain,
    step: DVector<Scalar>,
    /// bI − AI·x at the current iterate.
    slack: DVector<Scalar>,
    outcome: Outcome,
    shrink_rule: ShrinkRule,
}

impl<'a> ActiveSetSolver<'a> {
    pub fn new(problem: &'a Problem, options: SolveOptions) -> Self {
        let strategy = IterationStrategy::from_options(&options);
        let base = SolverBase::new(problem, options);
        let chain = PathChain::for_factor(base.chol());
        Self {
            strategy,
            working: WorkingSet::new(problem.inequality_count()),
            chain,
            step: DVector::zeros(problem.n()),
            slack: DVector::zeros(problem.inequality_count()),
            outcome: Outcome::Complete,
            shrink_rule: ShrinkRule::Multiplier,
            base,
        }
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working
    }

    fn update_slack(&mut self) {
        self.slack = self.base.problem().inequality_slack(self.base.x());
    }

    /// A feasible starting point plus an optional activity hint per
    /// inequality, or the terminal state when there is none.
    fn starting_point(
        &self,
        kick_starter: Option<&Solution>,
    ) -> Result<(DVector<Scalar>, Option<Vec<Scalar>>), State> {
        let problem = self.base.problem();
        let (n, m_eq, m_in) = (
            problem.n(),
            problem.equality_count(),
            problem.inequality_count(),
        );
        if let Some(kick) = kick_starter.filter(|kick| kick.state.is_feasible()) {
            let x = DVector::from_column_slice(&kick.primal);
            if kick.primal.len() == n && self.base.is_feasible(&x) {
                let hint = (kick.multipliers.len() == m_eq + m_in)
                    .then(|| kick.multipliers[m_eq..].to_vec());
                debug!(hinted = hint.is_some(), "starting from warm start");
                return Ok((x, hint));
            }
            debug!("warm start rejected, searching for a feasible point");
        }

        let pivots = 20 * (2 * n + m_eq + m_in) + 100;
        match find_feasible_point(problem, self.base.options().feasibility_tolerance, pivots) {
            LpOutcome::Infeasible => {
                info!("constraints admit no feasible point");
                Err(State::Infeasible)
            }
            LpOutcome::Exhausted => {
                warn!(pivots, "feasibility search gave up before deciding feasibility");
                Err(State::Failed)
            }
            LpOutcome::Optimal { x, multipliers } => Ok((x, Some(multipliers))),
            LpOutcome::Unbounded { x } => Ok((x, None)),
        }
    }

    /// Includes the tight constraints, hinted-active ones first, keeping at
    /// most n − mE of them.
    fn seed_working_set(&mut self, hint: Option<&[Scalar]>) {
        let problem = self.base.problem();
        let (ai, ae) = (problem.ai(), problem.ae());
        let capacity = problem.n().saturating_sub(problem.equality_count());
        let threshold = self.base.feasibility_threshold();
        let activity = |i: usize| hint.and_then(|h| h.get(i).copied()).unwrap_or(0.0);

        let candidates = (0..problem.inequality_count())
            .filter(|&i| self.slack[i] <= threshold)
            .sorted_by(|&a, &b| match (activity(a) > 0.0, activity(b) > 0.0) {
                (true, true) => activity(b)
                    .partial_cmp(&activity(a))
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b)),
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.cmp(&b),
            })
            .collect_vec();

        let mut working = WorkingSet::new(problem.inequality_count());
        for i in candidates {
            if working.included().len() >= capacity {
                break;
            }
            let parallel = working
                .included()
                .iter()
                .any(|&j| row_cosine(ai, i, ai, j) > PARALLEL_COSINE)
                || (0..ae.nrows()).any(|e| row_cosine(ai, i, ae, e) > PARALLEL_COSINE);
            if parallel {
                trace!(constraint = i, "skipping duplicate tight constraint");
                continue;
            }
            working.include(i);
        }
        working.clear_history();
        debug!(included = ?working.included(), "initial working set");
        self.working = working;
    }

    fn take_step(&mut self, solution: IterationSolution, included: &[usize]) -> Outcome {
        let problem = self.base.problem();
        let m_eq = problem.equality_count();
        let tolerance = self.base.options().solution_tolerance;

        let multipliers = self.base.multipliers_mut();
        multipliers.fill(0.0);
        multipliers
            .rows_mut(0, m_eq)
            .copy_from(&solution.multipliers.rows(0, m_eq));
        for (slot, &i) in included.iter().enumerate() {
            multipliers[m_eq + i] = solution.multipliers[m_eq + slot];
        }
        trace!(multipliers = ?self.base.multipliers().as_slice(), "iteration multipliers");

        self.step.copy_from(&solution.x);
        self.step -= self.base.x();
        let step_norm = self.step.norm();
        if step_norm <= tolerance * (1.0 + self.base.x().norm()) {
            trace!(step_norm, "negligible step");
            self.base.record(0.0, included.len(), IterationAction::Solved);
            return Outcome::Complete;
        }

        let (blocking, alpha) = self.ratio_test(step_norm);
        if blocking.is_none() && !solution.path.is_exact() && self.is_descent_ray(step_norm) {
            warn!("objective decreases along an unblocked direction of zero curvature");
            self.base.fail(State::Unbounded);
            self.base.record(0.0, included.len(), IterationAction::Solved);
            return Outcome::Terminal;
        }
        if let Some(i) = blocking {
            if alpha <= tolerance && self.working.last_excluded() == Some(i) {
                debug!(constraint = i, "zero step blocked by the constraint just excluded");
                self.base.record(0.0, included.len(), IterationAction::Stalled);
                return Outcome::Stalled;
            }
        }

        self.base.x_mut().axpy(alpha, &self.step, 1.0);
        self.update_slack();
        debug!(step_length = alpha, ?blocking, "step taken");
        self.base.record(alpha, included.len(), IterationAction::Solved);
        trace!(objective = self.base.objective_value(), "iterate updated");
        match blocking {
            Some(i) => Outcome::Blocked(i),
            None => Outcome::Complete,
        }
    }

    /// Largest fraction of the step keeping every excluded constraint
    /// satisfied, with the constraint that limits it. Ties go to the lowest index.
    fn ratio_test(&self, step_norm: Scalar) -> (Option<usize>, Scalar) {
        let ai = self.base.problem().ai();
        let tolerance = self.base.options().feasibility_tolerance;
        let mut best: Option<(usize, Scalar)> = None;
        for &i in self.working.excluded() {
            let change = row_dot(ai, i, &self.step);
            if change <= tolerance * row_norm(ai, i) * step_norm {
                continue;
            }
            // Slack below zero (within tolerance) blocks at α = 0.
            let alpha = self.slack[i].max(0.0) / change;
            if best.map_or(true, |(_, shortest)| alpha < shortest) {
                best = Some((i, alpha));
            }
        }
        match best {
            Some((i, alpha)) if alpha < 1.0 => (Some(i), alpha),
            _ => (None, 1.0),
        }
    }

    /// True when the step has no curvature and decreases the objective.
    fn is_descent_ray(&self, step_norm: Scalar) -> bool {
        let problem = self.base.problem();
        let tolerance = self.base.options().feasibility_tolerance;
        let q = problem.q();
        let curvature = self.step.dot(&(q * &self.step));
        let gradient = q * self.base.x() - problem.c();
        let slope = gradient.dot(&self.step);
        let flat = curvature <= tolerance * max_abs_diagonal(q).max(1.0) * step_norm * step_norm;
        flat && slope < -tolerance * (1.0 + gradient.norm()) * step_norm
    }

    /// Drops one included constraint after every solve path failed,
    /// alternating between the two selection rules.
    fn shrink(&mut self, included: &[usize]) -> Outcome {
        let problem = self.base.problem();
        let m_eq = problem.equality_count();
        let rule = self.shrink_rule;
        let dropped = match rule {
            ShrinkRule::Multiplier => {
                let multipliers = self.base.multipliers();
                included.iter().copied().min_by(|&a, &b| {
                    multipliers[m_eq + a]
                        .partial_cmp(&multipliers[m_eq + b])
                        .unwrap_or(Ordering::Equal)
                })
            }
            ShrinkRule::Parallel => {
                let ai = problem.ai();
                let reference = self
                    .working
                    .last_included()
                    .filter(|i| included.contains(i))
                    .or_else(|| included.last().copied());
                reference.map(|reference| {
                    let mut best = (reference, Scalar::NEG_INFINITY);
                    for &i in included.iter().filter(|&&i| i != reference) {
                        let cosine = row_cosine(ai, i, ai, reference);
                        if cosine > best.1 {
                            best = (i, cosine);
                        }
                    }
                    best.0
                })
            }
        };
        self.shrink_rule = match rule {
            ShrinkRule::Multiplier => ShrinkRule::Parallel,
            ShrinkRule::Parallel => ShrinkRule::Multiplier,
        };
        let Some(dropped) = dropped else {
            return self.terminate();
        };
        self.working.exclude(dropped);
        self.base.multipliers_mut()[m_eq + dropped] = 0.0;
        debug!(constraint = dropped, ?rule, "working set shrunk after failed solve");
        self.base
            .record(0.0, included.len(), IterationAction::Shrunk(dropped));
        Outcome::Shrunk
    }

    /// No solve path succeeded with an empty working set.
    fn terminate(&mut self) -> Outcome {
        let rows = self.base.problem().equality_count();
        let rank = self.base.equality_rank();
        if rank < rows {
            warn!(rank, rows, "equality system is rank deficient");
            self.base.fail(State::Failed);
        } else {
            warn!("objective is unbounded on the equality constraints");
            self.base.fail(State::Unbounded);
        }
        self.base.record(0.0, 0, IterationAction::Solved);
        Outcome::Terminal
    }

    /// The included constraint with the most negative multiplier, avoiding
    /// the one included last when there is another choice.
    fn exclusion_candidate(&self) -> Option<usize> {
        let m_eq = self.base.problem().equality_count();
        let threshold = -self.base.options().multiplier_tolerance;
        let multipliers = self.base.multipliers();
        let candidates = self
            .working
            .included()
            .iter()
            .copied()
            .filter(|&i| multipliers[m_eq + i] < threshold)
            .sorted_by(|&a, &b| {
                multipliers[m_eq + a]
                    .partial_cmp(&multipliers[m_eq + b])
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b))
            })
            .collect_vec();
        let last = self.working.last_included();
        candidates
            .iter()
            .copied()
            .find(|&i| Some(i) != last)
            .or_else(|| candidates.first().copied())
    }
}

impl<'a> QpIteration<'a> for ActiveSetSolver<'a> {
    fn base(&self) -> &SolverBase<'a> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SolverBase<'a> {
        &mut self.base
    }

    fn initialise(&mut self, kick_starter: Option<&Solution>) -> bool {
        let (x, hint) = match self.starting_point(kick_starter) {
            Ok(start) => start,
            Err(state) => {
                self.base.fail(state);
                return false;
            }
        };
        if !self.base.is_feasible(&x) {
            warn!(
                violation = self.base.problem().max_violation(&x),
                "starting point is only approximately feasible"
            );
        }
        *self.base.x_mut() = x;
        self.base.set_state(State::Feasible);
        self.update_slack();
        self.seed_working_set(hint.as_deref());
        self.chain = PathChain::for_factor(self.base.chol());
        self.shrink_rule = ShrinkRule::Multiplier;
        debug!(paths = ?self.chain.paths(), "solve paths");
        true
    }

    fn perform_iteration(&mut self) {
        let included = self.working.included().to_vec();
        let solved = self
            .chain
            .solve(&mut self.strategy, &mut self.base, &included);
        self.outcome = match solved {
            Some(solution) => self.take_step(solution, &included),
            None if !included.is_empty() => self.shrink(&included),
            None => self.terminate(),
        };
    }

    fn needs_another_iteration(&mut self) -> bool {
        let m_eq = self.base.problem().equality_count();
        match self.outcome {
            Outcome::Terminal => false,
            Outcome::Shrunk => true,
            Outcome::Blocked(i) => {
                self.working.include(i);
                self.base.amend_action(IterationAction::Included(i));
                debug!(constraint = i, "constraint included");
                true
            }
            Outcome::Complete | Outcome::Stalled => {
                if let Some(i) = self.exclusion_candidate() {
                    self.working.exclude(i);
                    self.base.multipliers_mut()[m_eq + i] = 0.0;
                    self.base.amend_action(IterationAction::Excluded(i));
                    debug!(constraint = i, "constraint excluded");
                    return true;
                }
                if self.outcome == Outcome::Complete {
                    self.base.set_state(State::Optimal);
                    self.base.amend_action(IterationAction::Converged);
                } else {
                    self.base.set_state(State::Feasible);
                    self.base.amend_action(IterationAction::Stalled);
                }
                false
            }
        }
    }

    fn finalise(&mut self) {
        match self.base.state() {
            State::Optimal | State::Infeasible | State::Unbounded | State::Failed => {}
            _ if self.base.is_feasible(self.base.x()) => {
                if self.outcome != Outcome::Stalled {
                    info!(iterations = self.base.iterations(), "iteration limit reached");
                }
                self.base.set_state(State::Feasible);
            }
            _ => {
                warn!("stopped at an infeasible iterate");
                self.base.fail(State::Failed);
            }
        }
    }
}
