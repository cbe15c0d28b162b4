//! Pure helpers for the position-weight, concentration, and cash-ratio
//! constraint checks layered on top of the Monte Carlo tail-risk figures.

use std::collections::BTreeMap;

/// Herfindahl-Hirschman concentration index over the non-cash allocation
/// weights: `sum(w_i^2)`.
pub fn herfindahl_index(allocations: &BTreeMap<String, f64>) -> f64 {
    allocations
        .iter()
        .filter(|(symbol, _)| symbol.as_str() != "cash")
        .map(|(_, w)| w * w)
        .sum()
}

/// The cash weight that results from the proposed rebalance: the explicit
/// `cash` entry if present, otherwise whatever remains after the named
/// allocations.
pub fn resulting_cash_weight(allocations: &BTreeMap<String, f64>) -> f64 {
    if let Some(cash) = allocations.get("cash") {
        return *cash;
    }
    1.0 - allocations.values().sum::<f64>()
}
