use activeqp_core::math::Scalar;
use activeqp_core::problem::ProblemError;
use thiserror::Error;

/// Failures that abort a solve. Numerically recoverable conditions are
/// reported through [`activeqp_core::State`] instead; the validation
/// variants only surface when strict validation is requested.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error("quadratic matrix is not symmetric (max asymmetry {asymmetry:.3e})")]
    AsymmetricQuadratic { asymmetry: Scalar },
    #[error("quadratic matrix is not positive semidefinite (min eigenvalue {min_eigenvalue:.3e})")]
    NotPositiveSemidefinite { min_eigenvalue: Scalar },
    #[error("equality constraints are rank deficient (rank {rank} of {rows} rows)")]
    RankDeficientEqualities { rank: usize, rows: usize },
    #[error("iterate violates the constraints by {violation:.3e}")]
    InfeasibleIterate { violation: Scalar },
}
