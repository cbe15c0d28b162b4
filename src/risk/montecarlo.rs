//! Seeded Monte Carlo path simulation and tail-risk (VaR/ES) estimation.
//!
//! Each path gets its own derived seed so that generating paths in
//! parallel (via rayon) never changes the result: path `i`'s outcome
//! depends only on `(base_seed, i)`, never on execution order.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::portfolio::MarketStats;

/// Minimum number of tail samples the ES estimate is allowed to average
/// over; below this the window is widened past the nominal `1 - alpha`
/// fraction and `es_sample_floor` is reported.
const MIN_TAIL_SAMPLES: usize = 20;

fn derive_path_seed(base_seed: u64, path_index: u64) -> u64 {
    // splitmix64-style mix so adjacent path indices don't produce
    // correlated RNG streams.
    let mut z = base_seed.wrapping_add(path_index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Cholesky factor of the covariance matrix, used to correlate the
/// per-symbol daily shocks. Falls back to a diagonal sqrt if the matrix
/// is not positive-definite (e.g. a degenerate single-symbol input).
fn cholesky_factor(market_stats: &MarketStats) -> DMatrix<f64> {
    let n = market_stats.n();
    let cov = DMatrix::from_fn(n, n, |i, j| market_stats.cov(i, j));
    match nalgebra::linalg::Cholesky::new(cov.clone()) {
        Some(chol) => chol.l(),
        None => DMatrix::from_fn(n, n, |i, j| if i == j { cov[(i, i)].max(0.0).sqrt() } else { 0.0 }),
    }
}

/// Simulates `n_paths` independent `horizon_days`-day cumulative portfolio
/// returns under the proposed `weights`, given `market_stats`'s mean
/// returns and covariance. Deterministic for a fixed `(market_stats,
/// weights, seed, n_paths)` regardless of thread count.
pub fn simulate_paths(market_stats: &MarketStats, weights: &[f64], seed: u64, n_paths: usize) -> Vec<f64> {
    let n = market_stats.n();
    let mean = DVector::from_vec(market_stats.mean_returns.clone());
    let l = cholesky_factor(market_stats);
    let horizon = market_stats.horizon_days.max(1);

    (0..n_paths)
        .into_par_iter()
        .map(|path_index| {
            let mut rng = ChaCha8Rng::seed_from_u64(derive_path_seed(seed, path_index as u64));
            let mut cumulative = 1.0f64;
            for _ in 0..horizon {
                let z = DVector::from_fn(n, |_, _| StandardNormal.sample(&mut rng));
                let correlated = &l * &z;
                let daily_shock = &mean + &correlated;
                let daily_return: f64 = weights.iter().zip(daily_shock.iter()).map(|(w, r)| w * r).sum();
                cumulative *= 1.0 + daily_return;
            }
            cumulative - 1.0
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailRisk {
    pub var: f64,
    pub expected_shortfall: f64,
    pub es_sample_floor: bool,
}

/// Computes VaR and Expected Shortfall at `alpha` confidence from a set of
/// simulated path returns, widening the tail window to the worst
/// `MIN_TAIL_SAMPLES` paths (and reporting `es_sample_floor`) when the
/// nominal `(1 - alpha)` fraction would select fewer.
pub fn tail_risk(path_returns: &[f64], alpha: f64) -> TailRisk {
    let mut sorted = path_returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n == 0 {
        return TailRisk {
            var: 0.0,
            expected_shortfall: 0.0,
            es_sample_floor: false,
        };
    }

    let nominal_tail = (((1.0 - alpha) * n as f64).ceil() as usize).max(1);
    let (tail_n, es_sample_floor) = if nominal_tail < MIN_TAIL_SAMPLES {
        (MIN_TAIL_SAMPLES.min(n), true)
    } else {
        (nominal_tail, false)
    };

    let var = -sorted[tail_n - 1];
    let tail = &sorted[..tail_n];
    let expected_shortfall = -(tail.iter().sum::<f64>() / tail.len() as f64);

    TailRisk {
        var,
        expected_shortfall,
        es_sample_floor,
    }
}
