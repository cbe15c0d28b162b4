use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use apex_core::portfolio::MarketStats;
use apex_core::risk::{simulate_paths, tail_risk};

fn market_stats(n: usize) -> MarketStats {
    let symbols: Vec<String> = (0..n).map(|i| format!("SYM{i}")).collect();
    let mean_returns = vec![0.0004; n];
    let mut cov_matrix = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            cov_matrix[i * n + j] = if i == j { 0.0004 } else { 0.00005 };
        }
    }
    MarketStats {
        symbols,
        mean_returns,
        cov_matrix,
        horizon_days: 10,
    }
}

// ── Group 1: path_count — Monte Carlo path scaling ───────────────────────────

fn bench_path_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate_paths_by_count");
    let stats = market_stats(5);
    let weights = vec![0.15, 0.15, 0.15, 0.15, 0.4];
    for &n_paths in &[1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(n_paths as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_paths), &n_paths, |b, &paths| {
            b.iter(|| simulate_paths(&stats, &weights, 42, paths));
        });
    }
    group.finish();
}

// ── Group 2: symbol_count — covariance dimensionality scaling ───────────────

fn bench_symbol_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate_paths_by_symbol_count");
    for &n in &[2usize, 10, 30] {
        let stats = market_stats(n);
        let weights = vec![1.0 / n as f64; n];
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter_batched(
                || (stats.clone(), weights.clone()),
                |(stats, weights)| simulate_paths(&stats, &weights, 7, 10_000),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

// ── Group 3: tail_risk — VaR/ES reduction over a fixed path set ─────────────

fn bench_tail_risk(c: &mut Criterion) {
    let stats = market_stats(5);
    let weights = vec![0.15, 0.15, 0.15, 0.15, 0.4];
    let paths = simulate_paths(&stats, &weights, 42, 50_000);

    let mut group = c.benchmark_group("tail_risk");
    group.throughput(Throughput::Elements(paths.len() as u64));
    group.bench_function("var_es_95", |b| {
        b.iter(|| tail_risk(&paths, 0.95));
    });
    group.finish();
}

criterion_group!(benches, bench_path_count, bench_symbol_count, bench_tail_risk);
criterion_main!(benches);
