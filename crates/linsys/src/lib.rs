#![forbid(unsafe_code)]

pub mod dense;
pub mod iterative;
pub mod kkt;

pub use activeqp_core::traits::{Factorization, FactorizationError, FactorizationResult};
pub use dense::{min_eigenvalue, numerical_rank, CholeskyFactor, LuFactor};
pub use iterative::EquationSystem;
pub use kkt::{kkt_matrix, solve_full_kkt, solve_schur, stack_rows, KktSolution};
