use activeqp_core::math::{max_abs_diagonal, Scalar};
use activeqp_core::traits::{Factorization, FactorizationError, FactorizationResult};
use nalgebra::linalg::{Cholesky, FullPivLU};
use nalgebra::{DMatrix, DVector, Dyn};
use tracing::warn;

/// Cholesky factorization of a symmetric matrix. When the matrix is not
/// numerically SPD, [`CholeskyFactor::factor_with_fallback`] retries with
/// a diagonal shift and remembers that the factor is perturbed.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    dimension: usize,
    factor: Option<Cholesky<Scalar, Dyn>>,
    perturbation: Scalar,
    pivot_tolerance: Scalar,
}

impl CholeskyFactor {
    pub fn new(pivot_tolerance: Scalar) -> Self {
        Self {
            dimension: 0,
            factor: None,
            perturbation: 0.0,
            pivot_tolerance,
        }
    }

    /// Tries `matrix`, then `matrix + δI` with δ = `factor`·max(max|Mii|, 1).
    pub fn factor_with_fallback(
        &mut self,
        matrix: &DMatrix<Scalar>,
        factor: Scalar,
    ) -> FactorizationResult<()> {
        match self.factor(matrix) {
            Ok(()) => Ok(()),
            Err(FactorizationError::NotPositiveDefinite) => {
                let shift = factor * max_abs_diagonal(matrix).max(1.0);
                warn!(shift, "cholesky failed, retrying with diagonal perturbation");
                let mut shifted = matrix.clone();
                for i in 0..shifted.nrows() {
                    shifted[(i, i)] += shift;
                }
                self.factor(&shifted)?;
                self.perturbation = shift;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// True when the last factorization succeeded without a diagonal shift.
    pub fn is_spd(&self) -> bool {
        self.factor.is_some() && self.perturbation == 0.0
    }

    pub fn is_perturbed(&self) -> bool {
        self.factor.is_some() && self.perturbation > 0.0
    }

    pub fn perturbation(&self) -> Scalar {
        self.perturbation
    }

    fn inner(&self) -> FactorizationResult<&Cholesky<Scalar, Dyn>> {
        self.factor.as_ref().ok_or(FactorizationError::NotFactored)
    }

    fn check_rows(&self, rows: usize) -> FactorizationResult<()> {
        if rows != self.dimension {
            return Err(FactorizationError::DimensionMismatch {
                expected: self.dimension,
                found: rows,
            });
        }
        Ok(())
    }
}

impl Factorization for CholeskyFactor {
    fn factor(&mut self, matrix: &DMatrix<Scalar>) -> FactorizationResult<()> {
        if matrix.nrows() != matrix.ncols() {
            return Err(FactorizationError::DimensionMismatch {
                expected: matrix.nrows(),
                found: matrix.ncols(),
            });
        }
        self.factor = None;
        self.perturbation = 0.0;
        self.dimension = matrix.nrows();
        let chol = Cholesky::new(matrix.clone()).ok_or(FactorizationError::NotPositiveDefinite)?;
        let (smallest, largest) = chol
            .l_dirty()
            .diagonal()
            .iter()
            .fold((Scalar::INFINITY, 0.0 as Scalar), |(lo, hi), l| {
                let pivot = l * l;
                (lo.min(pivot), hi.max(pivot))
            });
        if self.dimension > 0 && smallest <= self.pivot_tolerance * largest {
            return Err(FactorizationError::NotPositiveDefinite);
        }
        self.factor = Some(chol);
        Ok(())
    }

    fn solve(&self, rhs: &DMatrix<Scalar>) -> FactorizationResult<DMatrix<Scalar>> {
        self.check_rows(rhs.nrows())?;
        Ok(self.inner()?.solve(rhs))
    }

    fn solve_vector(&self, rhs: &DVector<Scalar>) -> FactorizationResult<DVector<Scalar>> {
        self.check_rows(rhs.len())?;
        Ok(self.inner()?.solve(rhs))
    }

    fn is_solvable(&self) -> bool {
        self.factor.is_some()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// LU factorization with full pivoting; a matrix whose numerical rank is
/// below its dimension is reported as singular.
#[derive(Debug, Clone)]
pub struct LuFactor {
    dimension: usize,
    lu: Option<FullPivLU<Scalar, Dyn, Dyn>>,
    rank: usize,
    rank_tolerance: Scalar,
}

impl LuFactor {
    pub fn new(rank_tolerance: Scalar) -> Self {
        Self {
            dimension: 0,
            lu: None,
            rank: 0,
            rank_tolerance,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl Factorization for LuFactor {
    fn factor(&mut self, matrix: &DMatrix<Scalar>) -> FactorizationResult<()> {
        if matrix.nrows() != matrix.ncols() {
            return Err(FactorizationError::DimensionMismatch {
                expected: matrix.nrows(),
                found: matrix.ncols(),
            });
        }
        self.dimension = matrix.nrows();
        let lu = FullPivLU::new(matrix.clone());
        self.rank = pivot_rank(&lu.u(), self.rank_tolerance);
        self.lu = Some(lu);
        if self.rank < self.dimension {
            return Err(FactorizationError::Singular {
                rank: self.rank,
                dimension: self.dimension,
            });
        }
        Ok(())
    }

    fn solve(&self, rhs: &DMatrix<Scalar>) -> FactorizationResult<DMatrix<Scalar>> {
        if !self.is_solvable() {
            return Err(self.singular());
        }
        if rhs.nrows() != self.dimension {
            return Err(FactorizationError::DimensionMismatch {
                expected: self.dimension,
                found: rhs.nrows(),
            });
        }
        self.lu
            .as_ref()
            .and_then(|lu| lu.solve(rhs))
            .ok_or_else(|| self.singular())
    }

    fn solve_vector(&self, rhs: &DVector<Scalar>) -> FactorizationResult<DVector<Scalar>> {
        if !self.is_solvable() {
            return Err(self.singular());
        }
        if rhs.len() != self.dimension {
            return Err(FactorizationError::DimensionMismatch {
                expected: self.dimension,
                found: rhs.len(),
            });
        }
        self.lu
            .as_ref()
            .and_then(|lu| lu.solve(rhs))
            .ok_or_else(|| self.singular())
    }

    fn is_solvable(&self) -> bool {
        self.lu.is_some() && self.rank == self.dimension
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

impl LuFactor {
    fn singular(&self) -> FactorizationError {
        if self.lu.is_none() {
            return FactorizationError::NotFactored;
        }
        FactorizationError::Singular {
            rank: self.rank,
            dimension: self.dimension,
        }
    }
}

/// Counts the significant pivots on the leading diagonal of `u`, which is
/// min(m, n)×n for an m×n input.
fn pivot_rank(u: &DMatrix<Scalar>, tolerance: Scalar) -> usize {
    let pivots: Vec<Scalar> = (0..u.nrows().min(u.ncols()))
        .map(|i| u[(i, i)].abs())
        .collect();
    let largest = pivots.iter().copied().fold(0.0, Scalar::max);
    if largest == 0.0 {
        return 0;
    }
    pivots
        .iter()
        .filter(|&&pivot| pivot > tolerance * largest)
        .count()
}

/// Numerical rank of a possibly rectangular matrix, from full-pivot LU.
pub fn numerical_rank(matrix: &DMatrix<Scalar>, tolerance: Scalar) -> usize {
    if matrix.nrows() == 0 || matrix.ncols() == 0 {
        return 0;
    }
    let lu = FullPivLU::new(matrix.clone());
    pivot_rank(&lu.u(), tolerance)
}

/// Smallest eigenvalue of a symmetric matrix. Diagnostic only.
pub fn min_eigenvalue(matrix: &DMatrix<Scalar>) -> Scalar {
    if matrix.nrows() == 0 {
        return 0.0;
    }
    matrix
        .clone()
        .symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(Scalar::INFINITY, Scalar::min)
}
