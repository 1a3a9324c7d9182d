use nalgebra::{DMatrix, DVector};
use std::time::{Duration, Instant};

pub type Scalar = f64;

pub fn dot(lhs: &[Scalar], rhs: &[Scalar]) -> Scalar {
    assert_eq!(lhs.len(), rhs.len(), "dot product dimension mismatch");
    lhs.iter().zip(rhs.iter()).fold(0.0, |acc, (a, b)| acc + a * b)
}

pub fn norm2(data: &[Scalar]) -> Scalar {
    dot(data, data).sqrt()
}

/// Inner product of row `row` of `matrix` with `x`.
pub fn row_dot(matrix: &DMatrix<Scalar>, row: usize, x: &DVector<Scalar>) -> Scalar {
    assert_eq!(matrix.ncols(), x.len(), "row dot dimension mismatch");
    matrix
        .row(row)
        .iter()
        .zip(x.iter())
        .fold(0.0, |acc, (a, b)| acc + a * b)
}

pub fn row_norm(matrix: &DMatrix<Scalar>, row: usize) -> Scalar {
    matrix
        .row(row)
        .iter()
        .fold(0.0, |acc, a| acc + a * a)
        .sqrt()
}

/// Absolute cosine of the angle between two matrix rows, zero if either is null.
pub fn row_cosine(
    lhs: &DMatrix<Scalar>,
    lhs_row: usize,
    rhs: &DMatrix<Scalar>,
    rhs_row: usize,
) -> Scalar {
    let numerator = lhs
        .row(lhs_row)
        .iter()
        .zip(rhs.row(rhs_row).iter())
        .fold(0.0, |acc, (a, b)| acc + a * b);
    let denominator = row_norm(lhs, lhs_row) * row_norm(rhs, rhs_row);
    if denominator > 0.0 {
        (numerator / denominator).abs()
    } else {
        0.0
    }
}

pub fn max_abs_diagonal(matrix: &DMatrix<Scalar>) -> Scalar {
    matrix
        .diagonal()
        .iter()
        .fold(0.0, |acc: Scalar, value| acc.max(value.abs()))
}

/// Largest |M[i,j] - M[j,i]| over a square matrix.
pub fn max_asymmetry(matrix: &DMatrix<Scalar>) -> Scalar {
    let n = matrix.nrows().min(matrix.ncols());
    let mut worst: Scalar = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            worst = worst.max((matrix[(i, j)] - matrix[(j, i)]).abs());
        }
    }
    worst
}

/// ½xᵗQx − cᵗx
pub fn quadratic_objective(q: &DMatrix<Scalar>, c: &DVector<Scalar>, x: &DVector<Scalar>) -> Scalar {
    let qx = q * x;
    0.5 * x.dot(&qx) - c.dot(x)
}

#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
    elapsed: Duration,
    running: bool,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Duration::ZERO,
            running: true,
        }
    }

    pub fn stop(&mut self) {
        if self.running {
            self.elapsed += self.start.elapsed();
            self.running = false;
        }
    }

    pub fn elapsed(&self) -> Duration {
        if self.running {
            self.elapsed + self.start.elapsed()
        } else {
            self.elapsed
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
