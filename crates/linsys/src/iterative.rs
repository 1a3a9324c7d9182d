use crate::dense::CholeskyFactor;
use activeqp_core::math::{dot, norm2, Scalar};
use activeqp_core::traits::{Factorization, FactorizationError, FactorizationResult};
use nalgebra::DVector;
use tracing::{debug, trace};

/// Conjugate gradient runs before the residual is given up on: the first
/// solve plus one refinement from the recomputed residual.
const PASSES: usize = 2;

struct Equation<K> {
    key: K,
    /// Q⁻¹aᵢᵗ
    projected: DVector<Scalar>,
    /// aᵢ·Q⁻¹c − bᵢ
    rhs: Scalar,
    /// aᵢ·Q⁻¹aⱼᵗ for every equation j, in equation order.
    coefficients: Vec<Scalar>,
    /// Last multiplier, reused as the starting guess.
    multiplier: Scalar,
}

/// Schur-complement equations S λ = A·Q⁻¹c − b kept row by row.
///
/// Adding a constraint costs one solve with the factor of Q plus one inner
/// product per existing equation; removing one only drops its row and
/// column. The system is resolved with conjugate gradients, warm-started
/// from the previous multipliers.
///
/// The residual of row i equals aᵢ·x − bᵢ for the recovered primal, so a
/// residual limit bounds the violation of the included constraints.
pub struct EquationSystem<K> {
    equations: Vec<Equation<K>>,
    unconstrained: DVector<Scalar>,
    tolerance: Scalar,
    residual_limit: Option<Scalar>,
}

impl<K> EquationSystem<K>
where
    K: Copy + PartialEq + std::fmt::Debug,
{
    /// `unconstrained` is Q⁻¹c for the factor later passed to [`Self::add`].
    pub fn new(unconstrained: DVector<Scalar>, tolerance: Scalar) -> Self {
        Self {
            equations: Vec::new(),
            unconstrained,
            tolerance,
            residual_limit: None,
        }
    }

    /// Absolute bound on the residual norm, on top of the relative tolerance.
    pub fn with_residual_limit(mut self, limit: Scalar) -> Self {
        self.residual_limit = Some(limit);
        self
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.equations.iter().map(|equation| equation.key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.equations.iter().any(|equation| equation.key == key)
    }

    pub fn add(
        &mut self,
        key: K,
        row: &DVector<Scalar>,
        rhs: Scalar,
        chol: &CholeskyFactor,
    ) -> FactorizationResult<()> {
        let projected = chol.solve_vector(row)?;
        let mut coefficients = Vec::with_capacity(self.equations.len() + 1);
        for equation in self.equations.iter_mut() {
            let value = row.dot(&equation.projected);
            equation.coefficients.push(value);
            coefficients.push(value);
        }
        coefficients.push(row.dot(&projected));
        let rhs = row.dot(&self.unconstrained) - rhs;
        self.equations.push(Equation {
            key,
            projected,
            rhs,
            coefficients,
            multiplier: 0.0,
        });
        trace!(?key, size = self.equations.len(), "equation added");
        Ok(())
    }

    /// Drops the equation for `key`; returns false if it was not present.
    pub fn remove(&mut self, key: K) -> bool {
        let Some(position) = self.equations.iter().position(|e| e.key == key) else {
            return false;
        };
        self.equations.remove(position);
        for equation in self.equations.iter_mut() {
            equation.coefficients.remove(position);
        }
        trace!(?key, size = self.equations.len(), "equation removed");
        true
    }

    fn apply(&self, input: &[Scalar], output: &mut [Scalar]) {
        for (equation, out) in self.equations.iter().zip(output.iter_mut()) {
            *out = dot(&equation.coefficients, input);
        }
    }

    /// rhs − S·λ
    fn residual(&self, rhs: &[Scalar], solution: &[Scalar]) -> Vec<Scalar> {
        let mut product = vec![0.0; solution.len()];
        self.apply(solution, &mut product);
        rhs.iter().zip(&product).map(|(b, s)| b - s).collect()
    }

    /// Solves in place from `residual`; returns the iterations used.
    fn conjugate_gradient(
        &self,
        solution: &mut [Scalar],
        residual: &mut [Scalar],
        threshold: Scalar,
        rhs_norm: Scalar,
    ) -> FactorizationResult<usize> {
        let m = solution.len();
        let limit = 4 * m + 10;
        let mut product = vec![0.0; m];
        let mut direction = residual.to_vec();
        let mut residual_sq = dot(residual, residual);
        let mut iterations = 0;

        while residual_sq.sqrt() > threshold {
            if iterations >= limit {
                return Err(FactorizationError::NotConverged {
                    iterations,
                    residual: residual_sq.sqrt() / rhs_norm,
                });
            }
            self.apply(&direction, &mut product);
            let curvature = dot(&direction, &product);
            if curvature <= 0.0 || !curvature.is_finite() {
                return Err(FactorizationError::NotConverged {
                    iterations,
                    residual: residual_sq.sqrt() / rhs_norm,
                });
            }
            let alpha = residual_sq / curvature;
            for i in 0..m {
                solution[i] += alpha * direction[i];
                residual[i] -= alpha * product[i];
            }
            let next_sq = dot(residual, residual);
            let beta = next_sq / residual_sq;
            for i in 0..m {
                direction[i] = residual[i] + beta * direction[i];
            }
            residual_sq = next_sq;
            iterations += 1;
        }
        Ok(iterations)
    }

    /// Conjugate gradient solve; returns the multipliers in equation order.
    ///
    /// Converged means the recomputed residual meets both the relative
    /// tolerance and the residual limit; otherwise `NotConverged`.
    pub fn solve(&mut self) -> FactorizationResult<DVector<Scalar>> {
        let m = self.equations.len();
        if m == 0 {
            return Ok(DVector::zeros(0));
        }
        let rhs: Vec<Scalar> = self.equations.iter().map(|e| e.rhs).collect();
        let rhs_norm = norm2(&rhs);
        if rhs_norm == 0.0 {
            for equation in self.equations.iter_mut() {
                equation.multiplier = 0.0;
            }
            return Ok(DVector::zeros(m));
        }
        let relative = self.tolerance * rhs_norm;
        let threshold = self.residual_limit.map_or(relative, |limit| limit.min(relative));

        let mut solution: Vec<Scalar> = self.equations.iter().map(|e| e.multiplier).collect();
        let mut residual = self.residual(&rhs, &solution);
        let mut iterations = 0;
        for pass in 0..PASSES {
            if norm2(&residual) <= threshold {
                break;
            }
            if pass > 0 {
                debug!(residual = norm2(&residual), threshold, "refining conjugate gradient solve");
            }
            iterations += self.conjugate_gradient(&mut solution, &mut residual, threshold, rhs_norm)?;
            residual = self.residual(&rhs, &solution);
        }
        let residual_norm = norm2(&residual);
        if residual_norm > threshold {
            return Err(FactorizationError::NotConverged {
                iterations,
                residual: residual_norm / rhs_norm,
            });
        }
        trace!(iterations, size = m, "conjugate gradient converged");

        for (equation, value) in self.equations.iter_mut().zip(&solution) {
            equation.multiplier = *value;
        }
        Ok(DVector::from_vec(solution))
    }

    /// x = Q⁻¹c − Σ λᵢ·Q⁻¹aᵢᵗ
    pub fn primal(&self, multipliers: &DVector<Scalar>) -> DVector<Scalar> {
        let mut x = self.unconstrained.clone();
        for (equation, lambda) in self.equations.iter().zip(multipliers.iter()) {
            x.axpy(-*lambda, &equation.projected, 1.0);
        }
        x
    }
}
