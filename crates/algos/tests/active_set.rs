use activeqp_algos::{ActiveSetSolver, EqualitySolver, QpIteration, QpSolver, SolverError};
use activeqp_core::math::Scalar;
use activeqp_core::options::{SolveOptions, Strategy};
use activeqp_core::problem::Problem;
use activeqp_core::solution::{Solution, State};
use activeqp_core::stats::IterationAction;
use anyhow::Result;
use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn solve(problem: &Problem, options: SolveOptions) -> Result<Solution> {
    Ok(QpSolver::new(problem, options).solve(None)?)
}

/// Random strictly convex problem whose constraints all hold at a random anchor point.
fn random_problem(rng: &mut SmallRng, n: usize, m_eq: usize, m_in: usize) -> Problem {
    random_problem_shifted(rng, n, m_eq, m_in, 1.0)
}

/// Q = RᵗR + shift·I; with no shift Q may be badly conditioned.
fn random_problem_shifted(
    rng: &mut SmallRng,
    n: usize,
    m_eq: usize,
    m_in: usize,
    shift: Scalar,
) -> Problem {
    let root = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
    let q = root.transpose() * &root + DMatrix::identity(n, n) * shift;
    let c = DVector::from_fn(n, |_, _| rng.gen_range(-5.0..5.0));
    let anchor = DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0));
    let ae = DMatrix::from_fn(m_eq, n, |_, _| rng.gen_range(-1.0..1.0));
    let be = &ae * &anchor;
    let ai = DMatrix::from_fn(m_in, n, |_, _| rng.gen_range(-1.0..1.0));
    let margin = DVector::from_fn(m_in, |_, _| rng.gen_range(0.0..0.5));
    let bi = &ai * &anchor + margin;
    Problem::new(q, c, ae, be, ai, bi).unwrap()
}

fn assert_kkt(problem: &Problem, solution: &Solution, tolerance: Scalar) {
    let m_eq = problem.equality_count();
    let x = DVector::from_column_slice(&solution.primal);
    let lambda_e = DVector::from_column_slice(solution.equality_multipliers(m_eq));
    let lambda_i = DVector::from_column_slice(solution.inequality_multipliers(m_eq));
    let stationarity = problem.q() * &x - problem.c()
        + problem.ae().transpose() * &lambda_e
        + problem.ai().transpose() * &lambda_i;
    assert!(stationarity.amax() < tolerance, "stationarity {stationarity}");
    assert!(problem.max_violation(&x) < tolerance);
    let slack = problem.inequality_slack(&x);
    for i in 0..problem.inequality_count() {
        assert!(lambda_i[i] >= -tolerance, "multiplier {i} is {}", lambda_i[i]);
        assert!((lambda_i[i] * slack[i]).abs() < tolerance);
    }
}

fn half_plane_problem(ai: DMatrix<Scalar>, bi: &[Scalar]) -> Problem {
    // minimize x² + y²
    Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]),
        DVector::zeros(2),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
        ai,
        DVector::from_row_slice(bi),
    )
    .unwrap()
}

#[test]
fn unconstrained_identity() -> Result<()> {
    init_tracing();
    let problem = Problem::unconstrained(DMatrix::identity(2, 2), DVector::from_vec(vec![1.0, 1.0]))?;
    let solution = solve(&problem, SolveOptions::default())?;
    assert!(solution.state.is_optimal());
    assert_eq!(solution.state, State::Distinct);
    assert_abs_diff_eq!(solution.primal[0], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(solution.primal[1], 1.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn single_active_inequality() -> Result<()> {
    init_tracing();
    // x + y >= 1
    let problem = half_plane_problem(DMatrix::from_row_slice(1, 2, &[-1.0, -1.0]), &[-1.0]);
    for strategy in [Strategy::Direct, Strategy::Iterative] {
        let solution = solve(&problem, SolveOptions::with_strategy(strategy))?;
        assert_eq!(solution.state, State::Optimal);
        assert_abs_diff_eq!(solution.primal[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.primal[1], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.multipliers[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(solution.objective_value, 0.5, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn contradictory_bounds_are_infeasible() -> Result<()> {
    // x >= 2 and x <= 1
    let problem = Problem::new(
        DMatrix::identity(1, 1),
        DVector::zeros(1),
        DMatrix::zeros(0, 1),
        DVector::zeros(0),
        DMatrix::from_row_slice(2, 1, &[-1.0, 1.0]),
        DVector::from_vec(vec![-2.0, 1.0]),
    )?;
    let solution = solve(&problem, SolveOptions::default())?;
    assert_eq!(solution.state, State::Infeasible);
    assert_eq!(solution.primal, vec![0.0]);
    assert!(solution.multipliers.iter().all(|&m| m == 0.0));
    Ok(())
}

#[test]
fn direct_and_iterative_agree() -> Result<()> {
    init_tracing();
    let mut rng = SmallRng::seed_from_u64(7);
    for _ in 0..8 {
        let problem = random_problem(&mut rng, 6, 1, 10);
        let direct = solve(&problem, SolveOptions::with_strategy(Strategy::Direct))?;
        let iterative = solve(&problem, SolveOptions::with_strategy(Strategy::Iterative))?;
        assert_eq!(direct.state, State::Optimal);
        assert_eq!(iterative.state, State::Optimal);
        for (a, b) in direct.primal.iter().zip(&iterative.primal) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn iterative_strategy_stays_feasible_on_ill_conditioned_quadratics() -> Result<()> {
    init_tracing();
    let mut rng = SmallRng::seed_from_u64(474);
    for trial in 0..300 {
        let problem = random_problem_shifted(&mut rng, 2, 1, 16, 0.0);
        let threshold = SolveOptions::default().feasibility_tolerance * problem.rhs_scale();
        let direct = solve(&problem, SolveOptions::with_strategy(Strategy::Direct))?;
        let iterative = solve(&problem, SolveOptions::with_strategy(Strategy::Iterative))?;
        for solution in [&direct, &iterative] {
            if solution.state.is_feasible() {
                let violation = problem.max_violation(&DVector::from_column_slice(&solution.primal));
                assert!(violation <= threshold, "trial {trial}: violation {violation:e}");
            }
        }
        if direct.state == State::Optimal && iterative.state == State::Optimal {
            let scale = 1.0 + direct.objective_value.abs();
            assert!(
                (direct.objective_value - iterative.objective_value).abs() <= 1e-7 * scale,
                "trial {trial}: objectives {} and {}",
                direct.objective_value,
                iterative.objective_value
            );
        }
    }
    Ok(())
}

#[test]
fn optimal_solutions_satisfy_kkt_conditions() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(42);
    for (n, m_eq, m_in) in [(3, 0, 5), (5, 2, 8), (8, 3, 20), (4, 0, 1)] {
        let problem = random_problem(&mut rng, n, m_eq, m_in);
        let solution = solve(&problem, SolveOptions::default())?;
        assert_eq!(solution.state, State::Optimal);
        assert_kkt(&problem, &solution, 1e-7);
    }
    Ok(())
}

#[test]
fn objective_never_increases() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(3);
    for _ in 0..5 {
        let problem = random_problem(&mut rng, 6, 1, 12);
        let solution = solve(&problem, SolveOptions::default())?;
        let objectives: Vec<Scalar> = solution.stats.objectives().collect();
        assert_eq!(objectives.len(), solution.iterations);
        for pair in objectives.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9 * (1.0 + pair[0].abs()), "{pair:?}");
        }
        let last = solution.stats.history.last().map(|record| record.action);
        assert_eq!(last, Some(IterationAction::Converged));
    }
    Ok(())
}

#[test]
fn resolving_is_idempotent() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(11);
    let problem = random_problem(&mut rng, 5, 1, 9);
    let first = solve(&problem, SolveOptions::default())?;
    let second = solve(&problem, SolveOptions::default())?;
    assert_eq!(first.state, second.state);
    assert_eq!(first.iterations, second.iterations);
    for (a, b) in first.primal.iter().zip(&second.primal) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn without_inequalities_matches_equality_solver() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(5);
    let problem = random_problem(&mut rng, 5, 2, 0);
    let equality = EqualitySolver::new(&problem, SolveOptions::default()).solve(None)?;
    let active_set = ActiveSetSolver::new(&problem, SolveOptions::default()).solve(None)?;
    assert_eq!(equality.state, State::Distinct);
    assert_eq!(active_set.state, State::Optimal);
    for (a, b) in equality.primal.iter().zip(&active_set.primal) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
    for (a, b) in equality.multipliers.iter().zip(&active_set.multipliers) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn warm_start_reuses_the_active_set() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(19);
    let problem = random_problem(&mut rng, 6, 1, 12);
    let cold = solve(&problem, SolveOptions::default())?;
    let warm = QpSolver::new(&problem, SolveOptions::default()).solve(Some(&cold))?;
    assert_eq!(warm.state, State::Optimal);
    assert_eq!(warm.iterations, 1);
    assert!(warm.iterations <= cold.iterations);
    for (a, b) in cold.primal.iter().zip(&warm.primal) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }

    // A primal-only warm start is still accepted.
    let seed = Solution::feasible_start(cold.primal.clone());
    let seeded = QpSolver::new(&problem, SolveOptions::default()).solve(Some(&seed))?;
    assert_eq!(seeded.state, State::Optimal);
    assert_kkt(&problem, &seeded, 1e-7);
    Ok(())
}

#[test]
fn infeasible_warm_start_is_ignored() -> Result<()> {
    let problem = half_plane_problem(DMatrix::from_row_slice(1, 2, &[-1.0, -1.0]), &[-1.0]);
    let seed = Solution::feasible_start(vec![0.0, 0.0]);
    let solution = QpSolver::new(&problem, SolveOptions::default()).solve(Some(&seed))?;
    assert_eq!(solution.state, State::Optimal);
    assert_abs_diff_eq!(solution.primal[0], 0.5, epsilon = 1e-9);
    Ok(())
}

#[test]
fn linear_program_through_zero_quadratic() -> Result<()> {
    // maximize x + 2y s.t. x + y <= 4, x <= 2, y <= 3, x, y >= 0
    let ai = DMatrix::from_row_slice(5, 2, &[1.0, 1.0, 1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0]);
    let problem = Problem::new(
        DMatrix::zeros(2, 2),
        DVector::from_vec(vec![1.0, 2.0]),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
        ai,
        DVector::from_vec(vec![4.0, 2.0, 3.0, 0.0, 0.0]),
    )?;
    let solution = solve(&problem, SolveOptions::default())?;
    assert_eq!(solution.state, State::Optimal);
    assert_abs_diff_eq!(solution.primal[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.primal[1], 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.objective_value, -7.0, epsilon = 1e-9);
    assert_kkt(&problem, &solution, 1e-7);
    Ok(())
}

#[test]
fn unbounded_linear_program() -> Result<()> {
    // maximize x s.t. x >= 0
    let problem = Problem::new(
        DMatrix::zeros(2, 2),
        DVector::from_vec(vec![1.0, 0.0]),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
        DMatrix::from_row_slice(1, 2, &[-1.0, 0.0]),
        DVector::zeros(1),
    )?;
    let solution = solve(&problem, SolveOptions::default())?;
    assert_eq!(solution.state, State::Unbounded);
    assert_eq!(solution.primal, vec![0.0, 0.0]);
    Ok(())
}

#[test]
fn duplicate_constraints_do_not_cycle() -> Result<()> {
    // x + y >= 1 three times, once scaled
    let ai = DMatrix::from_row_slice(3, 2, &[-1.0, -1.0, -1.0, -1.0, -2.0, -2.0]);
    let problem = half_plane_problem(ai, &[-1.0, -1.0, -2.0]);
    for strategy in [Strategy::Direct, Strategy::Iterative] {
        let solution = solve(&problem, SolveOptions::with_strategy(strategy))?;
        assert_eq!(solution.state, State::Optimal);
        assert_abs_diff_eq!(solution.primal[0], 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(solution.primal[1], 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(solution.multipliers[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(solution.multipliers[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(solution.multipliers[2], 0.0, epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn iteration_limit_reports_feasible_iterate() -> Result<()> {
    // minimize (x − ½)² + (y − ½)² over the unit box, starting from the corner (1, 1)
    let ai = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0]);
    let problem = Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]),
        DVector::from_vec(vec![1.0, 1.0]),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
        ai,
        DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0]),
    )?;
    let options = SolveOptions {
        max_iterations: 1,
        ..SolveOptions::default()
    };
    let limited = solve(&problem, options)?;
    assert_eq!(limited.state, State::Feasible);
    assert_eq!(limited.iterations, 1);
    assert!(problem.max_violation(&DVector::from_column_slice(&limited.primal)) < 1e-9);

    let full = solve(&problem, SolveOptions::default())?;
    assert_eq!(full.state, State::Optimal);
    assert_abs_diff_eq!(full.primal[0], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(full.primal[1], 0.5, epsilon = 1e-9);
    Ok(())
}

#[test]
fn strict_validation_rejects_bad_input() -> Result<()> {
    let inequality = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
    let asymmetric = Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 1.0, -1.0, 2.0]),
        DVector::zeros(2),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
        inequality.clone(),
        DVector::from_vec(vec![1.0]),
    )?;
    let err = QpSolver::new(&asymmetric, SolveOptions::strict())
        .solve(None)
        .unwrap_err();
    assert!(matches!(err, SolverError::AsymmetricQuadratic { .. }));

    let indefinite = Problem::new(
        DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]),
        DVector::zeros(2),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
        inequality.clone(),
        DVector::from_vec(vec![1.0]),
    )?;
    let err = QpSolver::new(&indefinite, SolveOptions::strict())
        .solve(None)
        .unwrap_err();
    assert!(matches!(err, SolverError::NotPositiveSemidefinite { .. }));

    let dependent = Problem::new(
        DMatrix::identity(2, 2),
        DVector::zeros(2),
        DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]),
        DVector::from_vec(vec![1.0, 2.0]),
        inequality,
        DVector::from_vec(vec![1.0]),
    )?;
    let err = QpSolver::new(&dependent, SolveOptions::strict())
        .solve(None)
        .unwrap_err();
    assert!(matches!(
        err,
        SolverError::RankDeficientEqualities { rank: 1, rows: 2 }
    ));
    Ok(())
}

#[test]
fn strict_validation_accepts_a_single_equality() -> Result<()> {
    // minimize x² + y² s.t. x + y = 1, x <= 5
    let problem = Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]),
        DVector::zeros(2),
        DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
        DVector::from_vec(vec![1.0]),
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        DVector::from_vec(vec![5.0]),
    )?;
    let solution = solve(&problem, SolveOptions::strict())?;
    assert_eq!(solution.state, State::Optimal);
    assert_abs_diff_eq!(solution.primal[0], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.primal[1], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.multipliers[0], -1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.multipliers[1], 0.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn flat_equality_problem_without_a_factor_is_unbounded() -> Result<()> {
    // Q = diag(−1, 0) with x = 1: y is free and the KKT matrix is singular
    let problem = Problem::new(
        DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, 0.0]),
        DVector::zeros(2),
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        DVector::from_vec(vec![1.0]),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
    )?;
    let solution = solve(&problem, SolveOptions::default())?;
    assert_eq!(solution.state, State::Unbounded);
    assert_eq!(solution.primal, vec![0.0, 0.0]);
    Ok(())
}

#[test]
fn asymmetric_quadratic_is_symmetrized_without_strict_mode() -> Result<()> {
    let ai = DMatrix::from_row_slice(1, 2, &[-1.0, -1.0]);
    let asymmetric = Problem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 1.0, -1.0, 2.0]),
        DVector::zeros(2),
        DMatrix::zeros(0, 2),
        DVector::zeros(0),
        ai.clone(),
        DVector::from_vec(vec![-1.0]),
    )?;
    assert_abs_diff_eq!(asymmetric.asymmetry(), 2.0, epsilon = 1e-12);
    let solution = solve(&asymmetric, SolveOptions::default())?;
    let reference = solve(&half_plane_problem(ai, &[-1.0]), SolveOptions::default())?;
    assert_eq!(solution.state, State::Optimal);
    assert_abs_diff_eq!(solution.primal[0], reference.primal[0], epsilon = 1e-12);
    assert_abs_diff_eq!(solution.primal[1], reference.primal[1], epsilon = 1e-12);
    Ok(())
}

#[test]
fn dependent_equalities_fail_without_strict_mode() -> Result<()> {
    // x + y = 1 and 2x + 2y = 3 cannot both hold
    let problem = Problem::new(
        DMatrix::identity(2, 2),
        DVector::zeros(2),
        DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]),
        DVector::from_vec(vec![1.0, 3.0]),
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        DVector::from_vec(vec![5.0]),
    )?;
    let solution = solve(&problem, SolveOptions::default())?;
    assert_eq!(solution.state, State::Infeasible);
    Ok(())
}
