use crate::math::{max_asymmetry, quadratic_objective, Scalar};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("invalid structure: {0}")]
    InvalidStructure(String),
    #[error("neither a quadratic nor a linear objective term was supplied")]
    MissingObjective,
}

pub type ProblemResult<T> = Result<T, ProblemError>;

/// Compressed sparse column storage as it appears in serialized inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CscMatrix {
    pub nrows: usize,
    pub ncols: usize,
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
    pub data: Vec<Scalar>,
}

impl CscMatrix {
    pub fn empty(ncols: usize) -> Self {
        Self {
            nrows: 0,
            ncols,
            indptr: vec![0; ncols + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn validate(&self) -> ProblemResult<()> {
        if self.indptr.len() != self.ncols + 1 {
            return Err(ProblemError::DimensionMismatch(format!(
                "indptr length {} != ncols + 1 ({})",
                self.indptr.len(),
                self.ncols + 1
            )));
        }
        if self.indices.len() != self.data.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "indices length {} != data length {}",
                self.indices.len(),
                self.data.len()
            )));
        }
        if self.indptr.windows(2).any(|w| w[0] > w[1])
            || self.indptr.last().copied() != Some(self.nnz())
        {
            return Err(ProblemError::InvalidStructure(
                "indptr must be non-decreasing and end at nnz".into(),
            ));
        }
        if let Some(row) = self.indices.iter().find(|&&row| row >= self.nrows) {
            return Err(ProblemError::InvalidStructure(format!(
                "row index {row} out of range for {} rows",
                self.nrows
            )));
        }
        Ok(())
    }

    /// Densifies the matrix; duplicate entries are summed.
    pub fn to_dense(&self) -> ProblemResult<DMatrix<Scalar>> {
        self.validate()?;
        let mut dense = DMatrix::zeros(self.nrows, self.ncols);
        for col in 0..self.ncols {
            for idx in self.indptr[col]..self.indptr[col + 1] {
                dense[(self.indices[idx], col)] += self.data[idx];
            }
        }
        Ok(dense)
    }
}

/// Densifies an `sprs` matrix regardless of its storage order.
pub fn csmat_to_dense(matrix: &CsMat<Scalar>) -> DMatrix<Scalar> {
    let (rows, cols) = matrix.shape();
    let mut dense = DMatrix::zeros(rows, cols);
    let csc = matrix.is_csc();
    for (outer, vector) in matrix.outer_iterator().enumerate() {
        for (inner, value) in vector.iter() {
            let (row, col) = if csc { (inner, outer) } else { (outer, inner) };
            dense[(row, col)] += *value;
        }
    }
    dense
}

impl From<&CsMat<Scalar>> for CscMatrix {
    fn from(matrix: &CsMat<Scalar>) -> Self {
        let csc = matrix.to_csc();
        let (nrows, ncols) = csc.shape();
        Self {
            nrows,
            ncols,
            indptr: csc.indptr().raw_storage().to_vec(),
            indices: csc.indices().to_vec(),
            data: csc.data().to_vec(),
        }
    }
}

/// Immutable description of
///
/// ```text
///     minimize    ½ xᵗQx − cᵗx
///     subject to  AE·x  = bE
///                 AI·x <= bI
/// ```
///
/// Q is stored in symmetric form; the asymmetry of the matrix that was
/// supplied is kept so solvers can report it during validation.
#[derive(Debug, Clone)]
pub struct Problem {
    q: DMatrix<Scalar>,
    c: DVector<Scalar>,
    ae: DMatrix<Scalar>,
    be: DVector<Scalar>,
    ai: DMatrix<Scalar>,
    bi: DVector<Scalar>,
    asymmetry: Scalar,
}

impl Problem {
    pub fn new(
        q: DMatrix<Scalar>,
        c: DVector<Scalar>,
        ae: DMatrix<Scalar>,
        be: DVector<Scalar>,
        ai: DMatrix<Scalar>,
        bi: DVector<Scalar>,
    ) -> ProblemResult<Self> {
        let n = c.len();
        if q.nrows() != n || q.ncols() != n {
            return Err(ProblemError::DimensionMismatch(format!(
                "quadratic matrix is {}x{} but the linear term has {n} entries",
                q.nrows(),
                q.ncols()
            )));
        }
        check_block("equality", &ae, &be, n)?;
        check_block("inequality", &ai, &bi, n)?;
        if let Some(bad) = q
            .iter()
            .chain(c.iter())
            .chain(ae.iter())
            .chain(be.iter())
            .chain(ai.iter())
            .chain(bi.iter())
            .find(|v| !v.is_finite())
        {
            return Err(ProblemError::InvalidStructure(format!(
                "non-finite coefficient {bad}"
            )));
        }
        let asymmetry = max_asymmetry(&q);
        let q = if asymmetry > 0.0 {
            (&q + q.transpose()) * 0.5
        } else {
            q
        };
        Ok(Self {
            q,
            c,
            ae,
            be,
            ai,
            bi,
            asymmetry,
        })
    }

    /// Unconstrained problem.
    pub fn unconstrained(q: DMatrix<Scalar>, c: DVector<Scalar>) -> ProblemResult<Self> {
        let n = c.len();
        Self::new(
            q,
            c,
            DMatrix::zeros(0, n),
            DVector::zeros(0),
            DMatrix::zeros(0, n),
            DVector::zeros(0),
        )
    }

    pub fn n(&self) -> usize {
        self.c.len()
    }

    pub fn equality_count(&self) -> usize {
        self.be.len()
    }

    pub fn inequality_count(&self) -> usize {
        self.bi.len()
    }

    pub fn q(&self) -> &DMatrix<Scalar> {
        &self.q
    }

    pub fn c(&self) -> &DVector<Scalar> {
        &self.c
    }

    pub fn ae(&self) -> &DMatrix<Scalar> {
        &self.ae
    }

    pub fn be(&self) -> &DVector<Scalar> {
        &self.be
    }

    pub fn ai(&self) -> &DMatrix<Scalar> {
        &self.ai
    }

    pub fn bi(&self) -> &DVector<Scalar> {
        &self.bi
    }

    /// Largest |Q[i,j] − Q[j,i]| of the matrix originally supplied.
    pub fn asymmetry(&self) -> Scalar {
        self.asymmetry
    }

    pub fn objective_value(&self, x: &DVector<Scalar>) -> Scalar {
        quadratic_objective(&self.q, &self.c, x)
    }

    /// bE − AE·x
    pub fn equality_slack(&self, x: &DVector<Scalar>) -> DVector<Scalar> {
        &self.be - &self.ae * x
    }

    /// bI − AI·x
    pub fn inequality_slack(&self, x: &DVector<Scalar>) -> DVector<Scalar> {
        &self.bi - &self.ai * x
    }

    /// Scale used to make feasibility tolerances relative: 1 + ‖(bE, bI)‖∞.
    pub fn rhs_scale(&self) -> Scalar {
        1.0 + self
            .be
            .iter()
            .chain(self.bi.iter())
            .fold(0.0, |acc: Scalar, v| acc.max(v.abs()))
    }

    /// Largest constraint violation at `x`: max(|bE − AE·x|∞, max(0, −(bI − AI·x))).
    pub fn max_violation(&self, x: &DVector<Scalar>) -> Scalar {
        let equality = self
            .equality_slack(x)
            .iter()
            .fold(0.0, |acc: Scalar, v| acc.max(v.abs()));
        let inequality = self
            .inequality_slack(x)
            .iter()
            .fold(0.0, |acc: Scalar, v| acc.max(-v));
        equality.max(inequality)
    }
}

fn check_block(
    name: &str,
    matrix: &DMatrix<Scalar>,
    rhs: &DVector<Scalar>,
    n: usize,
) -> ProblemResult<()> {
    if matrix.ncols() != n {
        return Err(ProblemError::DimensionMismatch(format!(
            "{name} matrix has {} columns, expected {n}",
            matrix.ncols()
        )));
    }
    if matrix.nrows() != rhs.len() {
        return Err(ProblemError::DimensionMismatch(format!(
            "{name} matrix has {} rows but its right-hand side has {} entries",
            matrix.nrows(),
            rhs.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn diagonal(n: usize) -> CscMatrix {
        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = Vec::with_capacity(n);
        let mut data = Vec::with_capacity(n);
        indptr.push(0);
        for i in 0..n {
            indices.push(i);
            data.push(1.0);
            indptr.push(indices.len());
        }
        CscMatrix {
            nrows: n,
            ncols: n,
            indptr,
            indices,
            data,
        }
    }

    #[test]
    fn csc_densifies() {
        let dense = diagonal(3).to_dense().unwrap();
        assert_eq!(dense, DMatrix::<Scalar>::identity(3, 3));
    }

    #[test]
    fn csc_rejects_out_of_range_rows() {
        let mut m = diagonal(2);
        m.indices[1] = 5;
        assert!(matches!(
            m.validate(),
            Err(ProblemError::InvalidStructure(_))
        ));
    }

    #[test]
    fn sprs_matrix_round_trips_through_csc() {
        let mut triplets = sprs::TriMat::new((2, 3));
        triplets.add_triplet(0, 2, 4.0);
        triplets.add_triplet(1, 0, -1.0);
        let csr: CsMat<Scalar> = triplets.to_csr();
        let dense = csmat_to_dense(&csr);
        assert_eq!(dense[(0, 2)], 4.0);
        assert_eq!(dense[(1, 0)], -1.0);
        let csc = CscMatrix::from(&csr);
        assert_eq!(csc.to_dense().unwrap(), dense);
    }

    #[test]
    fn empty_csc_has_no_rows() {
        let m = CscMatrix::empty(3);
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.to_dense().unwrap().shape(), (0, 3));
    }

    #[test]
    fn problem_symmetrizes_quadratic() {
        let q = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 2.0]);
        let problem = Problem::unconstrained(q, DVector::from_vec(vec![1.0, 1.0])).unwrap();
        assert_abs_diff_eq!(problem.asymmetry(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(problem.q()[(0, 1)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(problem.q()[(1, 0)], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn problem_detects_mismatch() {
        let result = Problem::new(
            DMatrix::identity(2, 2),
            DVector::zeros(2),
            DMatrix::zeros(1, 3),
            DVector::zeros(1),
            DMatrix::zeros(0, 2),
            DVector::zeros(0),
        );
        assert!(matches!(result, Err(ProblemError::DimensionMismatch(_))));

        let result = Problem::new(
            DMatrix::identity(2, 2),
            DVector::zeros(2),
            DMatrix::zeros(0, 2),
            DVector::zeros(0),
            DMatrix::zeros(2, 2),
            DVector::zeros(1),
        );
        assert!(matches!(result, Err(ProblemError::DimensionMismatch(_))));
    }

    #[test]
    fn slacks_and_violation() {
        let problem = Problem::new(
            DMatrix::identity(2, 2),
            DVector::zeros(2),
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            DVector::from_vec(vec![1.0]),
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DVector::from_vec(vec![0.25]),
        )
        .unwrap();
        let x = DVector::from_vec(vec![0.5, 0.5]);
        assert_abs_diff_eq!(problem.equality_slack(&x)[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(problem.inequality_slack(&x)[0], -0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(problem.max_violation(&x), 0.25, epsilon = 1e-12);
    }
}
