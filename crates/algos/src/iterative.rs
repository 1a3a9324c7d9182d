use crate::strategy::IterationSolve;
use activeqp_core::math::Scalar;
use activeqp_core::problem::Problem;
use activeqp_core::traits::Factorization;
use activeqp_linsys::{
    CholeskyFactor, EquationSystem, FactorizationError, FactorizationResult, KktSolution,
};
use nalgebra::DVector;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKey {
    Equality(usize),
    Inequality(usize),
}

/// Keeps the Schur equations across iterations. Each solve adds the rows
/// newly included and drops those excluded since the previous call, then
/// resolves the system with conjugate gradients.
///
/// The residual of the Schur equations is the violation of the rows held,
/// so the solve is also held to the feasibility tolerance.
pub struct IterativeStrategy {
    system: Option<EquationSystem<RowKey>>,
    tolerance: Scalar,
    feasibility_tolerance: Scalar,
}

impl IterativeStrategy {
    pub fn new(tolerance: Scalar, feasibility_tolerance: Scalar) -> Self {
        Self {
            system: None,
            tolerance,
            feasibility_tolerance,
        }
    }

    /// Number of equations currently held, equalities included.
    pub fn len(&self) -> usize {
        self.system.as_ref().map_or(0, EquationSystem::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn initial_system(
        problem: &Problem,
        chol: &CholeskyFactor,
        tolerance: Scalar,
        residual_limit: Scalar,
    ) -> FactorizationResult<EquationSystem<RowKey>> {
        let unconstrained = chol.solve_vector(problem.c())?;
        let mut system =
            EquationSystem::new(unconstrained, tolerance).with_residual_limit(residual_limit);
        let (ae, be) = (problem.ae(), problem.be());
        for row in 0..ae.nrows() {
            let coefficients = ae.row(row).transpose();
            system.add(RowKey::Equality(row), &coefficients, be[row], chol)?;
        }
        Ok(system)
    }
}

impl IterationSolve for IterativeStrategy {
    fn solve_schur(
        &mut self,
        problem: &Problem,
        chol: &CholeskyFactor,
        included: &[usize],
        _rank_tolerance: Scalar,
    ) -> FactorizationResult<KktSolution> {
        if self.system.is_none() {
            let residual_limit = self.feasibility_tolerance * problem.rhs_scale();
            self.system = Some(Self::initial_system(
                problem,
                chol,
                self.tolerance,
                residual_limit,
            )?);
        }
        let system = self.system.as_mut().ok_or(FactorizationError::NotFactored)?;

        let stale: Vec<RowKey> = system
            .keys()
            .filter(|key| matches!(key, RowKey::Inequality(i) if !included.contains(i)))
            .collect();
        for key in stale {
            system.remove(key);
        }
        let (ai, bi) = (problem.ai(), problem.bi());
        for &row in included {
            let key = RowKey::Inequality(row);
            if !system.contains(key) {
                let coefficients = ai.row(row).transpose();
                system.add(key, &coefficients, bi[row], chol)?;
            }
        }
        trace!(equations = system.len(), "equation system synchronised");

        let lambda = system.solve()?;
        let x = system.primal(&lambda);

        let m_eq = problem.equality_count();
        let mut multipliers = DVector::zeros(m_eq + included.len());
        for (key, value) in system.keys().zip(lambda.iter()) {
            match key {
                RowKey::Equality(row) => multipliers[row] = *value,
                RowKey::Inequality(row) => {
                    if let Some(slot) = included.iter().position(|&i| i == row) {
                        multipliers[m_eq + slot] = *value;
                    }
                }
            }
        }
        Ok(KktSolution { x, multipliers })
    }
}
