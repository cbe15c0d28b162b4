//! Broker adapter seam. Production order routing is out of scope; this
//! module exists so the Executor role has something concrete to call
//! against in tests and demos.

use async_trait::async_trait;

use crate::error::AppError;
use crate::proposal::{OrderIntent, OrderResult, OrderStatus};

#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderResult, AppError>;
}

/// Deterministic test double: fills every order at its limit price (or a
/// fixed mark for market orders), unless the symbol is in `reject_symbols`.
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    reject_symbols: Vec<String>,
    fallback_mark: f64,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            reject_symbols: Vec::new(),
            fallback_mark: 100.0,
        }
    }

    pub fn with_fallback_mark(mut self, mark: f64) -> Self {
        self.fallback_mark = mark;
        self
    }

    pub fn reject(mut self, symbol: impl Into<String>) -> Self {
        self.reject_symbols.push(symbol.into());
        self
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderResult, AppError> {
        if self.reject_symbols.iter().any(|s| s == &intent.symbol) {
            return Ok(OrderResult {
                intent_id: intent.id.clone(),
                status: OrderStatus::Rejected,
                fill_price: None,
                reason: Some(format!("{} not tradeable in this session", intent.symbol)),
            });
        }
        let fill_price = intent.limit_price.unwrap_or(self.fallback_mark);
        Ok(OrderResult {
            intent_id: intent.id.clone(),
            status: OrderStatus::Filled,
            fill_price: Some(fill_price),
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{OrderType, Side};

    fn intent(symbol: &str) -> OrderIntent {
        OrderIntent {
            id: "o1".into(),
            symbol: symbol.to_string(),
            side: Side::Buy,
            qty: 10.0,
            notional: 1_000.0,
            order_type: OrderType::Market,
            limit_price: None,
        }
    }

    #[tokio::test]
    async fn fills_at_fallback_mark_for_market_orders() {
        let broker = MockBroker::new().with_fallback_mark(150.0);
        let result = broker.submit(&intent("AAPL")).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.fill_price, Some(150.0));
    }

    #[tokio::test]
    async fn rejects_listed_symbols() {
        let broker = MockBroker::new().reject("AAPL");
        let result = broker.submit(&intent("AAPL")).await.unwrap();
        assert_eq!(result.status, OrderStatus::Rejected);
        assert!(result.reason.is_some());
    }
}
