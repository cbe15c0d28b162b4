//! Property-based invariants for the Monte Carlo risk engine: determinism
//! under a fixed seed, and that reducing risky exposure never increases
//! VaR for a simple uncorrelated two-asset book.

use std::collections::BTreeMap;

use apex_core::portfolio::{MarketStats, Portfolio, RiskConstraints};
use apex_core::proposal::StrategyProposal;
use apex_core::risk;
use proptest::prelude::*;

fn stats() -> MarketStats {
    MarketStats {
        symbols: vec!["AAPL".into(), "MSFT".into()],
        mean_returns: vec![0.0002, 0.0001],
        cov_matrix: vec![0.0003, 0.0, 0.0, 0.0002],
        horizon_days: 5,
    }
}

fn proposal(aapl_weight: f64, msft_weight: f64) -> StrategyProposal {
    StrategyProposal {
        allocations: BTreeMap::from([
            ("AAPL".to_string(), aapl_weight),
            ("MSFT".to_string(), msft_weight),
            ("cash".to_string(), (1.0 - aapl_weight - msft_weight).max(0.0)),
        ]),
        rationale: "property test".into(),
        confidence: 0.8,
    }
}

proptest! {
    #[test]
    fn evaluate_is_deterministic_for_any_seed(seed in any::<u64>(), aapl in 0.0f64..0.4, msft in 0.0f64..0.4) {
        let portfolio = Portfolio::new(10_000.0);
        let constraints = RiskConstraints::default();
        let p = proposal(aapl, msft);
        let a = risk::evaluate(&portfolio, &p, &stats(), &constraints, seed, 500, 0.95);
        let b = risk::evaluate(&portfolio, &p, &stats(), &constraints, seed, 500, 0.95);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn smaller_risky_exposure_never_increases_var(seed in any::<u64>(), base_aapl in 0.05f64..0.4) {
        let portfolio = Portfolio::new(10_000.0);
        let constraints = RiskConstraints::default();
        let larger = proposal(base_aapl, 0.0);
        let smaller = proposal(base_aapl / 2.0, 0.0);

        let larger_tail = risk::evaluate(&portfolio, &larger, &stats(), &constraints, seed, 2_000, 0.95);
        let smaller_tail = risk::evaluate(&portfolio, &smaller, &stats(), &constraints, seed, 2_000, 0.95);

        prop_assert!(smaller_tail.var_95 <= larger_tail.var_95 + 1e-9);
    }

    #[test]
    fn tightening_constraints_never_flips_a_rejection_to_an_approval(
        seed in any::<u64>(), aapl in 0.05f64..0.4, msft in 0.0f64..0.3,
    ) {
        let portfolio = Portfolio::new(10_000.0);
        let loose = RiskConstraints::default();
        let mut tight = loose.clone();
        tight.max_position_weight *= 0.5;
        tight.max_concentration_hhi *= 0.5;
        tight.max_drawdown *= 0.5;
        tight.min_cash_ratio = (tight.min_cash_ratio * 1.5).min(1.0);

        let p = proposal(aapl, msft);
        let loose_verdict = risk::evaluate(&portfolio, &p, &stats(), &loose, seed, 1_000, 0.95);
        let tight_verdict = risk::evaluate(&portfolio, &p, &stats(), &tight, seed, 1_000, 0.95);

        // Tightening every constraint can only turn an approval into a
        // rejection, never the reverse.
        prop_assert!(!(loose_verdict.approved == false && tight_verdict.approved == true));
    }

    #[test]
    fn round_count_never_exceeds_requested_paths(n_paths in 1usize..5_000) {
        let portfolio = Portfolio::new(10_000.0);
        let constraints = RiskConstraints::default();
        let p = proposal(0.1, 0.1);
        let verdict = risk::evaluate(&portfolio, &p, &stats(), &constraints, 7, n_paths, 0.95);
        // A verdict is always produced regardless of how small n_paths is.
        prop_assert!(verdict.var_95.is_finite());
        prop_assert!(verdict.expected_shortfall.is_finite());
    }
}
