//! Portfolio and market-statistics types consumed by the risk engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Normal,
    Volatile,
    Bullish,
    Bearish,
    Crisis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub qty: f64,
    pub avg_cost: f64,
}

/// `{cash, positions, equity}`. `equity` is derived and recomputed on each
/// mark — it is never set directly by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    equity: f64,
}

impl Portfolio {
    pub fn new(cash: f64) -> Self {
        let mut p = Self {
            cash,
            positions: BTreeMap::new(),
            equity: cash,
        };
        p.mark(&BTreeMap::new());
        p
    }

    /// Recompute `equity = cash + sum(qty * mark_price)` using the given
    /// mark prices (missing symbols fall back to `avg_cost`).
    pub fn mark(&mut self, mark_prices: &BTreeMap<String, f64>) -> f64 {
        let positions_value: f64 = self
            .positions
            .iter()
            .map(|(symbol, pos)| {
                let price = mark_prices.get(symbol).copied().unwrap_or(pos.avg_cost);
                pos.qty * price
            })
            .sum();
        self.equity = self.cash + positions_value;
        self.equity
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn position_weight(&self, symbol: &str, mark_prices: &BTreeMap<String, f64>) -> f64 {
        if self.equity <= 0.0 {
            return 0.0;
        }
        let price = self
            .positions
            .get(symbol)
            .map(|p| mark_prices.get(symbol).copied().unwrap_or(p.avg_cost))
            .unwrap_or(0.0);
        let qty = self.positions.get(symbol).map(|p| p.qty).unwrap_or(0.0);
        (qty * price) / self.equity
    }

    pub fn cash_ratio(&self) -> f64 {
        if self.equity <= 0.0 {
            return 0.0;
        }
        self.cash / self.equity
    }
}

/// `{max_position_weight, max_drawdown, min_cash_ratio, max_concentration_hhi}`.
/// Immutable within a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConstraints {
    pub max_position_weight: f64,
    pub max_drawdown: f64,
    pub min_cash_ratio: f64,
    pub max_concentration_hhi: f64,
}

impl Default for RiskConstraints {
    fn default() -> Self {
        Self {
            max_position_weight: 0.35,
            max_drawdown: 0.20,
            min_cash_ratio: 0.05,
            max_concentration_hhi: 0.5,
        }
    }
}

/// Bundle of inputs the Monte Carlo engine needs: expected daily returns
/// per symbol and their covariance, in the same symbol order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub symbols: Vec<String>,
    pub mean_returns: Vec<f64>,
    /// Row-major `symbols.len() x symbols.len()` covariance matrix.
    pub cov_matrix: Vec<f64>,
    pub horizon_days: u32,
}

impl MarketStats {
    pub fn n(&self) -> usize {
        self.symbols.len()
    }

    pub fn cov(&self, i: usize, j: usize) -> f64 {
        self.cov_matrix[i * self.n() + j]
    }
}
