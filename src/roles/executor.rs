//! Executor role: turns an approved debate outcome into order intents —
//! rebalancing the portfolio toward the approved target weights — and
//! submits them through the broker adapter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agent::AgentHandler;
use crate::broker::BrokerAdapter;
use crate::bus::AgentNetwork;
use crate::error::AppError;
use crate::message::{Destination, Message, Role};
use crate::portfolio::Portfolio;
use crate::proposal::{OrderIntent, OrderType, Proposal, Side};

/// Orders below this notional are skipped: the rebalance isn't worth the
/// transaction friction.
pub const MIN_TRADE_NOTIONAL: f64 = 50.0;

pub struct ExecutorAgent {
    broker: Arc<dyn BrokerAdapter>,
    portfolio: Mutex<Portfolio>,
    mark_prices: Mutex<BTreeMap<String, f64>>,
    last_approved_allocations: Mutex<Option<BTreeMap<String, f64>>>,
    next_order_id: AtomicU64,
}

impl ExecutorAgent {
    pub fn new(broker: Arc<dyn BrokerAdapter>, portfolio: Portfolio) -> Self {
        Self {
            broker,
            portfolio: Mutex::new(portfolio),
            mark_prices: Mutex::new(BTreeMap::new()),
            last_approved_allocations: Mutex::new(None),
            next_order_id: AtomicU64::new(1),
        }
    }

    pub fn update_marks(&self, marks: BTreeMap<String, f64>) {
        *self.mark_prices.lock() = marks;
    }

    fn build_intents(&self, target: &BTreeMap<String, f64>) -> Vec<OrderIntent> {
        let portfolio = self.portfolio.lock();
        let marks = self.mark_prices.lock();
        let equity = portfolio.equity();
        let mut intents = Vec::new();

        for (symbol, target_weight) in target {
            if symbol == "cash" {
                continue;
            }
            let mark = marks.get(symbol).copied().unwrap_or(100.0);
            let current_weight = portfolio.position_weight(symbol, &marks);
            let delta_notional = (target_weight - current_weight) * equity;
            if delta_notional.abs() < MIN_TRADE_NOTIONAL {
                continue;
            }
            let side = if delta_notional > 0.0 { Side::Buy } else { Side::Sell };
            let qty = (delta_notional.abs() / mark).max(0.0);
            intents.push(OrderIntent {
                id: format!("ord-{}", self.next_order_id.fetch_add(1, Ordering::Relaxed)),
                symbol: symbol.clone(),
                side,
                qty,
                notional: delta_notional.abs(),
                order_type: OrderType::Market,
                limit_price: None,
            });
        }
        intents
    }
}

#[async_trait]
impl AgentHandler for ExecutorAgent {
    fn role(&self) -> Role {
        Role::Executor
    }

    fn subscriptions(&self) -> Vec<String> {
        vec!["proposal.strategy".to_string(), "debate.approved".to_string()]
    }

    async fn handle(&self, msg: &Message, bus: &AgentNetwork) -> Result<(), AppError> {
        match &msg.payload {
            Proposal::ProposalStrategy(proposal) => {
                *self.last_approved_allocations.lock() = Some(proposal.allocations.clone());
                Ok(())
            }
            Proposal::DebateApproved(_) => {
                let target = self.last_approved_allocations.lock().clone();
                let Some(target) = target else {
                    return Ok(());
                };
                let intents = self.build_intents(&target);
                for intent in intents {
                    bus.publish(
                        Role::Executor,
                        Destination::All,
                        "order.intent",
                        Proposal::OrderIntent(intent.clone()),
                        Some(msg.id),
                    );
                    let result = self.broker.submit(&intent).await;
                    let payload = match result {
                        Ok(order_result) => Proposal::OrderResult(order_result),
                        Err(err) => Proposal::OrderResult(crate::proposal::OrderResult {
                            intent_id: intent.id.clone(),
                            status: crate::proposal::OrderStatus::Failed,
                            fill_price: None,
                            reason: Some(err.to_string()),
                        }),
                    };
                    bus.publish(Role::Executor, Destination::All, "order.result", payload, Some(msg.id));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::proposal::{DebateOutcome, DebateResult, StrategyProposal};

    fn strategy_msg() -> Message {
        Message {
            id: 1,
            session_id: "s1".into(),
            from: Role::Strategy,
            to: Destination::All,
            topic: "proposal.strategy".into(),
            causation_id: None,
            ts: chrono::Utc::now(),
            payload: Proposal::ProposalStrategy(StrategyProposal {
                allocations: BTreeMap::from([("AAPL".to_string(), 0.5), ("cash".to_string(), 0.5)]),
                rationale: "test".into(),
                confidence: 0.8,
            }),
        }
    }

    fn approved_msg() -> Message {
        Message {
            id: 2,
            session_id: "s1".into(),
            from: Role::Orchestrator,
            to: Destination::All,
            topic: "debate.approved".into(),
            causation_id: Some(1),
            ts: chrono::Utc::now(),
            payload: Proposal::DebateApproved(DebateResult {
                round: 1,
                outcome: DebateOutcome::Approved,
                reason_chain: vec!["consensus reached".into()],
            }),
        }
    }

    #[tokio::test]
    async fn approval_triggers_order_submission() {
        let broker = Arc::new(MockBroker::new().with_fallback_mark(100.0));
        let agent = ExecutorAgent::new(broker, Portfolio::new(10_000.0));
        let bus = AgentNetwork::new("s1");
        let mut intent_sub = bus.subscribe(Role::Explainer, "order.intent");
        let mut result_sub = bus.subscribe(Role::Explainer, "order.result");

        agent.handle(&strategy_msg(), &bus).await.unwrap();
        agent.handle(&approved_msg(), &bus).await.unwrap();

        let intent_out = intent_sub.rx.recv().await.unwrap();
        assert_eq!(intent_out.payload.kind(), "order.intent");
        assert_eq!(intent_out.causation_id, Some(approved_msg().id));

        let result_out = result_sub.rx.recv().await.unwrap();
        assert_eq!(result_out.payload.kind(), "order.result");
    }

    #[tokio::test]
    async fn small_rebalance_is_skipped() {
        let broker = Arc::new(MockBroker::new());
        let agent = ExecutorAgent::new(broker, Portfolio::new(10_000.0));
        let bus = AgentNetwork::new("s1");
        let mut sub = bus.subscribe(Role::Explainer, "order.result");

        let mut msg = strategy_msg();
        if let Proposal::ProposalStrategy(p) = &mut msg.payload {
            p.allocations = BTreeMap::from([("AAPL".to_string(), 0.001), ("cash".to_string(), 0.999)]);
        }
        agent.handle(&msg, &bus).await.unwrap();
        agent.handle(&approved_msg(), &bus).await.unwrap();
        assert!(sub.rx.try_recv().is_err());
    }
}
