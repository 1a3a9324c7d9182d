//! Assembly and direct solution of the equality-constrained KKT system
//!
//! ```text
//!     [ Q   Aᵗ ] [x]   [c]
//!     [ A   0  ] [λ] = [b]
//! ```

use crate::dense::{CholeskyFactor, LuFactor};
use activeqp_core::math::Scalar;
use activeqp_core::traits::{Factorization, FactorizationResult};
use nalgebra::{DMatrix, DVector};

/// Primal/dual pair produced by a KKT solve.
#[derive(Debug, Clone)]
pub struct KktSolution {
    pub x: DVector<Scalar>,
    pub multipliers: DVector<Scalar>,
}

/// Stacks `upper` above the rows of `lower` listed in `rows`.
pub fn stack_rows(
    upper: &DMatrix<Scalar>,
    upper_rhs: &DVector<Scalar>,
    lower: &DMatrix<Scalar>,
    lower_rhs: &DVector<Scalar>,
    rows: &[usize],
) -> (DMatrix<Scalar>, DVector<Scalar>) {
    let n = upper.ncols().max(lower.ncols());
    let m_upper = upper.nrows();
    let m = m_upper + rows.len();
    let matrix = DMatrix::from_fn(m, n, |i, j| {
        if i < m_upper {
            upper[(i, j)]
        } else {
            lower[(rows[i - m_upper], j)]
        }
    });
    let rhs = DVector::from_fn(m, |i, _| {
        if i < m_upper {
            upper_rhs[i]
        } else {
            lower_rhs[rows[i - m_upper]]
        }
    });
    (matrix, rhs)
}

/// The full (n+m)×(n+m) KKT matrix.
pub fn kkt_matrix(q: &DMatrix<Scalar>, a: &DMatrix<Scalar>) -> DMatrix<Scalar> {
    let n = q.nrows();
    let m = a.nrows();
    DMatrix::from_fn(n + m, n + m, |i, j| match (i < n, j < n) {
        (true, true) => q[(i, j)],
        (true, false) => a[(j - n, i)],
        (false, true) => a[(i - n, j)],
        (false, false) => 0.0,
    })
}

/// Solves the full KKT system with a general factorization.
pub fn solve_full_kkt(
    q: &DMatrix<Scalar>,
    a: &DMatrix<Scalar>,
    c: &DVector<Scalar>,
    b: &DVector<Scalar>,
    rank_tolerance: Scalar,
) -> FactorizationResult<KktSolution> {
    let n = q.nrows();
    let m = a.nrows();
    let mut lu = LuFactor::new(rank_tolerance);
    lu.factor(&kkt_matrix(q, a))?;
    let rhs = DVector::from_fn(n + m, |i, _| if i < n { c[i] } else { b[i - n] });
    let solution = lu.solve_vector(&rhs)?;
    Ok(KktSolution {
        x: solution.rows(0, n).into_owned(),
        multipliers: solution.rows(n, m).into_owned(),
    })
}

/// Eliminates x through the factorization of Q and solves the Schur
/// complement S = A·Q⁻¹·Aᵗ for the multipliers:
///
/// ```text
///     S λ = A·Q⁻¹c − b,    x = Q⁻¹(c − Aᵗλ)
/// ```
pub fn solve_schur(
    chol: &CholeskyFactor,
    a: &DMatrix<Scalar>,
    c: &DVector<Scalar>,
    b: &DVector<Scalar>,
    rank_tolerance: Scalar,
) -> FactorizationResult<KktSolution> {
    let unconstrained = chol.solve_vector(c)?;
    if a.nrows() == 0 {
        return Ok(KktSolution {
            x: unconstrained,
            multipliers: DVector::zeros(0),
        });
    }
    let projected = chol.solve(&a.transpose())?;
    let schur = a * &projected;
    let mut lu = LuFactor::new(rank_tolerance);
    lu.factor(&schur)?;
    let multipliers = lu.solve_vector(&(a * &unconstrained - b))?;
    let x = unconstrained - &projected * &multipliers;
    Ok(KktSolution { x, multipliers })
}
