use crate::base::SolverBase;
use crate::direct::DirectStrategy;
use crate::iterative::IterativeStrategy;
use activeqp_core::math::Scalar;
use activeqp_core::options::{SolveOptions, Strategy};
use activeqp_core::problem::Problem;
use activeqp_linsys::{solve_full_kkt, stack_rows, CholeskyFactor, FactorizationResult, KktSolution};
use nalgebra::DVector;
use tracing::{debug, trace};

/// Solves the equality-constrained sub-problem of one iteration through
/// the Schur complement of the included rows.
///
/// The returned multipliers are laid out as the equality rows first, then
/// one entry per included inequality in inclusion order.
pub trait IterationSolve {
    fn solve_schur(
        &mut self,
        problem: &Problem,
        chol: &CholeskyFactor,
        included: &[usize],
        rank_tolerance: Scalar,
    ) -> FactorizationResult<KktSolution>;
}

/// Per-iteration linear-solve strategy, fixed at construction.
pub enum IterationStrategy {
    Direct(DirectStrategy),
    Iterative(IterativeStrategy),
}

impl IterationStrategy {
    pub fn from_options(options: &SolveOptions) -> Self {
        match options.strategy {
            Strategy::Direct => IterationStrategy::Direct(DirectStrategy),
            Strategy::Iterative => {
                IterationStrategy::Iterative(IterativeStrategy::new(
                options.iterative_tolerance,
                options.feasibility_tolerance,
            ))
            }
        }
    }
}

impl IterationSolve for IterationStrategy {
    fn solve_schur(
        &mut self,
        problem: &Problem,
        chol: &CholeskyFactor,
        included: &[usize],
        rank_tolerance: Scalar,
    ) -> FactorizationResult<KktSolution> {
        match self {
            IterationStrategy::Direct(direct) => {
                direct.solve_schur(problem, chol, included, rank_tolerance)
            }
            IterationStrategy::Iterative(iterative) => {
                iterative.solve_schur(problem, chol, included, rank_tolerance)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePath {
    /// Schur complement with the exact factor of Q.
    Schur,
    /// LU of the full augmented KKT matrix.
    FullKkt,
    /// Schur complement with the diagonally perturbed factor of Q.
    PerturbedSchur,
}

impl SolvePath {
    /// True when the path solves the sub-problem for the unperturbed Q.
    pub fn is_exact(self) -> bool {
        !matches!(self, SolvePath::PerturbedSchur)
    }
}

#[derive(Debug, Clone)]
pub struct IterationSolution {
    pub x: DVector<Scalar>,
    pub multipliers: DVector<Scalar>,
    pub path: SolvePath,
}

/// Ordered fallback list for the per-iteration solve, tried until the
/// first path succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChain {
    paths: Vec<SolvePath>,
}

impl PathChain {
    pub fn for_factor(chol: &CholeskyFactor) -> Self {
        let paths = if chol.is_spd() {
            vec![SolvePath::Schur, SolvePath::FullKkt]
        } else if chol.is_perturbed() {
            vec![SolvePath::FullKkt, SolvePath::PerturbedSchur]
        } else {
            vec![SolvePath::FullKkt]
        };
        Self { paths }
    }

    pub fn paths(&self) -> &[SolvePath] {
        &self.paths
    }

    pub fn solve<S: IterationSolve>(
        &self,
        strategy: &mut S,
        base: &mut SolverBase<'_>,
        included: &[usize],
    ) -> Option<IterationSolution> {
        let problem = base.problem();
        let tolerance = base.options().accuracy_tolerance;
        for &path in &self.paths {
            base.stats_mut().linear_solves += 1;
            let attempt = match path {
                SolvePath::Schur | SolvePath::PerturbedSchur => {
                    strategy.solve_schur(problem, base.chol(), included, tolerance)
                }
                SolvePath::FullKkt => {
                    let (a, b) =
                        stack_rows(problem.ae(), problem.be(), problem.ai(), problem.bi(), included);
                    solve_full_kkt(problem.q(), &a, problem.c(), &b, tolerance)
                }
            };
            match attempt {
                Ok(KktSolution { x, multipliers }) => {
                    trace!(?path, "iteration solved");
                    return Some(IterationSolution {
                        x,
                        multipliers,
                        path,
                    });
                }
                Err(err) => debug!(?path, %err, "solve path failed, falling back"),
            }
        }
        None
    }
}
