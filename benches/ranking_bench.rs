//! Criterion benchmarks for the circuit ranking encoder.
//!
//! Measures encoding cost on dense instances and end-to-end solve time on
//! small disjunctive instances.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use u_ranking::cp::{BacktrackingSolver, CpModel, CpSolver, LinearExpr, SolverConfig};
use u_ranking::ranking::{CircuitRanking, RankedTask};

// ===========================================================================
// Instance builder
// ===========================================================================

/// Optional tasks with durations `1..=n` in one no-overlap set.
fn build_instance(n: usize, horizon: i64) -> (CpModel, Vec<RankedTask>) {
    let mut model = CpModel::new("bench");
    let mut tasks = Vec::with_capacity(n);
    let mut intervals = Vec::with_capacity(n);
    for t in 0..n {
        let duration = t as i64 + 1;
        let start = model.new_int_var(0, horizon, format!("start[{t}]"));
        let presence = model.new_bool_var(format!("presence[{t}]"));
        intervals.push(model.new_optional_interval(start, duration, presence, format!("iv[{t}]")));
        let rank = model.new_int_var(-1, n as i64 - 1, format!("rank[{t}]"));
        tasks.push(RankedTask::new(start, duration, presence, rank));
    }
    model.add_no_overlap(intervals);
    (model, tasks)
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking_encode");
    group.sample_size(20);

    for &n in &[8usize, 32, 64] {
        let (model, tasks) = build_instance(n, 1_000);
        group.bench_with_input(BenchmarkId::from_parameter(n), &(model, tasks), |b, (m, t)| {
            b.iter(|| {
                let mut model = m.clone();
                let encoding = CircuitRanking::new(black_box(t)).encode(&mut model);
                black_box(encoding)
            })
        });
    }
    group.finish();
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking_solve");
    group.sample_size(10);

    for &n in &[3usize, 4, 5] {
        let horizon = 30;
        let (mut model, tasks) = build_instance(n, horizon);
        CircuitRanking::new(&tasks)
            .encode(&mut model)
            .expect("valid instance");
        let makespan = model.new_int_var(0, horizon, "makespan");
        for task in &tasks {
            model
                .add_le(task.start + task.duration, makespan)
                .only_enforce_if(task.presence);
        }
        let performed = LinearExpr::sum(tasks.iter().map(|t| t.presence));
        model.minimize(makespan * 2 - performed * 7);
        let config = SolverConfig::default().with_time_limit_ms(10_000);

        group.bench_with_input(BenchmarkId::from_parameter(n), &(model, config), |b, (m, c)| {
            b.iter(|| {
                let solution = BacktrackingSolver::new().solve(black_box(m), black_box(c));
                black_box(solution)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_solve);
criterion_main!(benches);
