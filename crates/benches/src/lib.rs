use activeqp_api::{Problem, ProblemError, QpBuilder};
use activeqp_core::math::Scalar;
use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::Rng;

/// Strictly convex QP with `m_eq` equalities and `m_in` inequalities, all
/// satisfied at a random interior anchor so the problem is feasible.
pub fn random_problem(
    rng: &mut SmallRng,
    n: usize,
    m_eq: usize,
    m_in: usize,
) -> Result<Problem, ProblemError> {
    let root = DMatrix::from_fn(n, n, |_, _| rng.gen::<Scalar>() - 0.5);
    let q = root.transpose() * &root + DMatrix::identity(n, n);
    let c: Vec<Scalar> = (0..n).map(|_| rng.gen::<Scalar>() * 10.0 - 5.0).collect();
    let anchor = DVector::from_fn(n, |_, _| rng.gen::<Scalar>() - 0.5);

    let ae = DMatrix::from_fn(m_eq, n, |_, _| rng.gen::<Scalar>() - 0.5);
    let be = &ae * &anchor;
    let ai = DMatrix::from_fn(m_in, n, |_, _| rng.gen::<Scalar>() - 0.5);
    let bi: Vec<Scalar> = (&ai * &anchor)
        .iter()
        .map(|value| value + 0.1 + rng.gen::<Scalar>() * 0.4)
        .collect();

    let mut builder = QpBuilder::new().q(q).c(c).inequalities(ai, bi);
    if m_eq > 0 {
        builder = builder.equalities(ae, be.iter().copied().collect());
    }
    builder.build()
}
