//! Benchmarks for the knapsack solver.
//!
//! Item counts follow typical table sizes (hundreds to tens of thousands of
//! segments); budgets cover both the exact and the discretized table.

use anticache::KnapsackSolver;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Deterministic pseudo-random items: values in [0, 100), costs in [1 KiB, 1 MiB).
fn generate_items(count: usize) -> (Vec<f64>, Vec<u64>) {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let values = (0..count).map(|_| (next() % 10_000) as f64 / 100.0).collect();
    let costs = (0..count).map(|_| 1024 + next() % (1024 * 1023)).collect();
    (values, costs)
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("knapsack_solve");
    let solver = KnapsackSolver::default();

    for count in [100usize, 1_000, 10_000] {
        let (values, costs) = generate_items(count);
        let total: u64 = costs.iter().sum();
        let budget = total / 3;

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("third_of_total", count), &count, |b, _| {
            b.iter(|| solver.solve(budget, &values, &costs))
        });
    }
    group.finish();
}

fn bench_exact_small_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("knapsack_exact");
    let solver = KnapsackSolver::new(1);

    for count in [50usize, 200] {
        let (values, costs) = generate_items(count);
        let costs: Vec<u64> = costs.iter().map(|c| c / 1024).collect();
        let budget = costs.iter().sum::<u64>() / 2;

        group.bench_with_input(BenchmarkId::new("half_of_total", count), &count, |b, _| {
            b.iter(|| solver.solve(budget, &values, &costs))
        });
    }
    group.finish();
}

fn bench_coarse_unit(c: &mut Criterion) {
    let (values, costs) = generate_items(5_000);
    let budget = costs.iter().sum::<u64>() / 4;
    let solver = KnapsackSolver::new(4096).with_max_dp_cells(1 << 20);

    c.bench_function("knapsack_coarse_unit_5000", |b| {
        b.iter(|| solver.solve(budget, &values, &costs))
    });
}

criterion_group!(benches, bench_solve, bench_exact_small_budget, bench_coarse_unit);
criterion_main!(benches);
