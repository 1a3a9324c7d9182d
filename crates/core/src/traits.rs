use crate::math::Scalar;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FactorizationError {
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,
    #[error("matrix is singular (rank {rank} of {dimension})")]
    Singular { rank: usize, dimension: usize },
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("iterative solve stopped after {iterations} iterations (relative residual {residual:.3e})")]
    NotConverged { iterations: usize, residual: Scalar },
    #[error("no factorization has been computed")]
    NotFactored,
}

pub type FactorizationResult<T> = Result<T, FactorizationError>;

/// Factorize-then-solve contract shared by the dense decompositions.
pub trait Factorization {
    fn factor(&mut self, matrix: &DMatrix<Scalar>) -> FactorizationResult<()>;

    fn solve(&self, rhs: &DMatrix<Scalar>) -> FactorizationResult<DMatrix<Scalar>>;

    fn solve_vector(&self, rhs: &DVector<Scalar>) -> FactorizationResult<DVector<Scalar>>;

    fn is_solvable(&self) -> bool;

    fn dimension(&self) -> usize;
}
