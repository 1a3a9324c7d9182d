#![forbid(unsafe_code)]

use activeqp_algos::QpSolver;
use activeqp_core::math::Scalar;
use activeqp_core::problem::{csmat_to_dense, CscMatrix, ProblemResult};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use tracing::debug;

pub use activeqp_algos::SolverError;
pub use activeqp_core::options::{SolveOptions, Strategy};
pub use activeqp_core::problem::{Problem, ProblemError};
pub use activeqp_core::solution::{Solution, State};
pub use activeqp_core::stats::{IterationAction, IterationRecord, SolveStats};

#[derive(Debug, Clone)]
enum MatrixInput {
    Dense(DMatrix<Scalar>),
    Csc(CscMatrix),
}

impl MatrixInput {
    fn into_dense(self) -> ProblemResult<DMatrix<Scalar>> {
        match self {
            MatrixInput::Dense(matrix) => Ok(matrix),
            MatrixInput::Csc(matrix) => matrix.to_dense(),
        }
    }
}

/// Assembles a [`Problem`]. Either the quadratic or the linear term must be
/// given; a missing Q is taken as zero (a linear program) and a missing c
/// as the zero vector. Absent constraint blocks have no rows.
#[derive(Debug, Clone, Default)]
pub struct QpBuilder {
    q: Option<MatrixInput>,
    c: Option<Vec<Scalar>>,
    equality: Option<(MatrixInput, Vec<Scalar>)>,
    inequality: Option<(MatrixInput, Vec<Scalar>)>,
}

impl QpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn q(mut self, matrix: DMatrix<Scalar>) -> Self {
        self.q = Some(MatrixInput::Dense(matrix));
        self
    }

    pub fn q_csc(mut self, matrix: CscMatrix) -> Self {
        self.q = Some(MatrixInput::Csc(matrix));
        self
    }

    pub fn q_sparse(self, matrix: &CsMat<Scalar>) -> Self {
        self.q(csmat_to_dense(matrix))
    }

    pub fn c(mut self, vector: Vec<Scalar>) -> Self {
        self.c = Some(vector);
        self
    }

    /// AE·x = bE
    pub fn equalities(mut self, matrix: DMatrix<Scalar>, rhs: Vec<Scalar>) -> Self {
        self.equality = Some((MatrixInput::Dense(matrix), rhs));
        self
    }

    pub fn equalities_csc(mut self, matrix: CscMatrix, rhs: Vec<Scalar>) -> Self {
        self.equality = Some((MatrixInput::Csc(matrix), rhs));
        self
    }

    pub fn equalities_sparse(self, matrix: &CsMat<Scalar>, rhs: Vec<Scalar>) -> Self {
        self.equalities(csmat_to_dense(matrix), rhs)
    }

    /// AI·x <= bI
    pub fn inequalities(mut self, matrix: DMatrix<Scalar>, rhs: Vec<Scalar>) -> Self {
        self.inequality = Some((MatrixInput::Dense(matrix), rhs));
        self
    }

    pub fn inequalities_csc(mut self, matrix: CscMatrix, rhs: Vec<Scalar>) -> Self {
        self.inequality = Some((MatrixInput::Csc(matrix), rhs));
        self
    }

    pub fn inequalities_sparse(self, matrix: &CsMat<Scalar>, rhs: Vec<Scalar>) -> Self {
        self.inequalities(csmat_to_dense(matrix), rhs)
    }

    pub fn build(self) -> Result<Problem, ProblemError> {
        let q = self.q.map(MatrixInput::into_dense).transpose()?;
        let n = match (&q, &self.c) {
            (_, Some(c)) => c.len(),
            (Some(q), None) => q.nrows(),
            (None, None) => return Err(ProblemError::MissingObjective),
        };
        let q = q.unwrap_or_else(|| DMatrix::zeros(n, n));
        let c = self
            .c
            .map_or_else(|| DVector::zeros(n), DVector::from_vec);
        let (ae, be) = constraint_block(self.equality, n)?;
        let (ai, bi) = constraint_block(self.inequality, n)?;
        let problem = Problem::new(q, c, ae, be, ai, bi)?;
        debug!(
            n,
            equalities = problem.equality_count(),
            inequalities = problem.inequality_count(),
            "problem built"
        );
        Ok(problem)
    }
}

fn constraint_block(
    block: Option<(MatrixInput, Vec<Scalar>)>,
    n: usize,
) -> ProblemResult<(DMatrix<Scalar>, DVector<Scalar>)> {
    match block {
        Some((matrix, rhs)) => Ok((matrix.into_dense()?, DVector::from_vec(rhs))),
        None => Ok((DMatrix::zeros(0, n), DVector::zeros(0))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintBlock {
    pub matrix: CscMatrix,
    pub rhs: Vec<Scalar>,
}

/// Serializable problem input in sparse column form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QpData {
    pub q: Option<CscMatrix>,
    pub c: Option<Vec<Scalar>>,
    pub equalities: Option<ConstraintBlock>,
    pub inequalities: Option<ConstraintBlock>,
}

impl From<QpData> for QpBuilder {
    fn from(data: QpData) -> Self {
        Self {
            q: data.q.map(MatrixInput::Csc),
            c: data.c,
            equality: data
                .equalities
                .map(|block| (MatrixInput::Csc(block.matrix), block.rhs)),
            inequality: data
                .inequalities
                .map(|block| (MatrixInput::Csc(block.matrix), block.rhs)),
        }
    }
}

pub struct Solver {
    options: SolveOptions,
    warm_start: Option<Solution>,
}

impl Solver {
    pub fn new() -> Self {
        Self {
            options: SolveOptions::default(),
            warm_start: None,
        }
    }

    pub fn options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    /// Seeds the next solve. Ignored unless the solution is marked feasible.
    pub fn warm_start(mut self, solution: Solution) -> Self {
        self.warm_start = Some(solution);
        self
    }

    pub fn solve(&mut self, problem: &Problem) -> Result<Solution, SolverError> {
        QpSolver::new(problem, self.options.clone()).solve(self.warm_start.as_ref())
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

pub fn solve_qp(problem: &Problem, options: SolveOptions) -> Result<Solution, SolverError> {
    Solver::new().options(options).solve(problem)
}
