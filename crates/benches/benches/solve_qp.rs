use activeqp_api::{SolveOptions, Solver, Strategy};
use activeqp_benches::random_problem;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, SeedableRng};

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("active_set_qp_solve");
    let mut rng = SmallRng::seed_from_u64(42);
    for (n, m_eq, m_in) in [(20, 2, 40), (50, 5, 100)] {
        let problem = random_problem(&mut rng, n, m_eq, m_in).unwrap();
        for strategy in [Strategy::Direct, Strategy::Iterative] {
            let id = BenchmarkId::new(format!("{strategy:?}"), format!("n={n}_m={m_in}"));
            group.bench_with_input(id, &problem, |b, problem| {
                b.iter(|| {
                    let mut solver = Solver::new().options(SolveOptions::with_strategy(strategy));
                    solver.solve(problem).unwrap()
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);
