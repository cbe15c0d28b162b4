//! Monte Carlo Risk Engine (C2): a pure, side-effect-free `evaluate` that
//! turns a portfolio, a proposed rebalance, and market statistics into a
//! `RiskVerdict`. Every call with the same inputs and seed produces a
//! bit-identical verdict regardless of thread count.

mod constraints;
mod montecarlo;
mod stress;

use std::collections::BTreeMap;

use crate::portfolio::{MarketStats, Portfolio, RiskConstraints};
use crate::proposal::{RiskVerdict, StrategyProposal};

pub use constraints::{herfindahl_index, resulting_cash_weight};
pub use montecarlo::{simulate_paths, tail_risk, TailRisk};
pub use stress::{stress_scenarios, StressScenario};

/// Builds the weight vector aligned to `market_stats.symbols`, missing
/// symbols defaulting to zero.
fn weights_vector(market_stats: &MarketStats, allocations: &BTreeMap<String, f64>) -> Vec<f64> {
    market_stats
        .symbols
        .iter()
        .map(|s| allocations.get(s).copied().unwrap_or(0.0))
        .collect()
}

/// Evaluates a proposed rebalance against the risk constraints. Pure
/// function: no I/O, no shared state, reproducible for a fixed `seed`.
pub fn evaluate(
    portfolio: &Portfolio,
    proposal: &StrategyProposal,
    market_stats: &MarketStats,
    constraints: &RiskConstraints,
    seed: u64,
    n_paths: usize,
    confidence_alpha: f64,
) -> RiskVerdict {
    let _ = portfolio;
    let weights = weights_vector(market_stats, &proposal.allocations);

    let paths = simulate_paths(market_stats, &weights, seed, n_paths);
    let tail = tail_risk(&paths, confidence_alpha);

    let mut violations = Vec::new();

    for (symbol, weight) in &proposal.allocations {
        if symbol == "cash" {
            continue;
        }
        if *weight > constraints.max_position_weight {
            violations.push(format!(
                "position {symbol} weight {weight:.4} exceeds max_position_weight {:.4}",
                constraints.max_position_weight
            ));
        }
    }

    let hhi = herfindahl_index(&proposal.allocations);
    if hhi > constraints.max_concentration_hhi {
        violations.push(format!(
            "concentration hhi {hhi:.4} exceeds max_concentration_hhi {:.4}",
            constraints.max_concentration_hhi
        ));
    }

    let cash_weight = resulting_cash_weight(&proposal.allocations);
    if cash_weight < constraints.min_cash_ratio {
        violations.push(format!(
            "resulting cash ratio {cash_weight:.4} below min_cash_ratio {:.4}",
            constraints.min_cash_ratio
        ));
    }

    if tail.var > constraints.max_drawdown {
        violations.push(format!(
            "var_{:.0} {:.4} exceeds max_drawdown {:.4}",
            confidence_alpha * 100.0,
            tail.var,
            constraints.max_drawdown
        ));
    }

    for scenario in stress_scenarios() {
        let shocked_return = scenario.apply(market_stats, &weights);
        if -shocked_return > constraints.max_drawdown {
            violations.push(format!(
                "stress scenario {} implies drawdown {:.4} exceeding max_drawdown {:.4}",
                scenario.id,
                -shocked_return,
                constraints.max_drawdown
            ));
        }
    }

    let approved = violations.is_empty();
    let rationale = if approved {
        format!(
            "within constraints: var_{:.0}={:.4}, es={:.4}, hhi={:.4}, cash={:.4}",
            confidence_alpha * 100.0,
            tail.var,
            tail.expected_shortfall,
            hhi,
            cash_weight
        )
    } else {
        format!("{} constraint violation(s)", violations.len())
    };

    RiskVerdict {
        approved,
        var_95: tail.var,
        expected_shortfall: tail.expected_shortfall,
        violations,
        rationale,
        es_sample_floor: tail.es_sample_floor,
    }
}
