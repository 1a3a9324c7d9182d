use crate::strategy::IterationSolve;
use activeqp_core::math::Scalar;
use activeqp_core::problem::Problem;
use activeqp_linsys::{solve_schur, stack_rows, CholeskyFactor, FactorizationResult, KktSolution};

/// Assembles the included rows and factors their Schur complement from
/// scratch every iteration. O(m²n + m³) per solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectStrategy;

impl IterationSolve for DirectStrategy {
    fn solve_schur(
        &mut self,
        problem: &Problem,
        chol: &CholeskyFactor,
        included: &[usize],
        rank_tolerance: Scalar,
    ) -> FactorizationResult<KktSolution> {
        let (a, b) = stack_rows(problem.ae(), problem.be(), problem.ai(), problem.bi(), included);
        solve_schur(chol, &a, problem.c(), &b, rank_tolerance)
    }
}
