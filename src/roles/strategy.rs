//! Strategy role: turns market snapshots (and debate round requests asking
//! for a revision) into allocation proposals via the Reasoner port.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agent::AgentHandler;
use crate::bus::AgentNetwork;
use crate::error::AppError;
use crate::message::{Destination, Message, Role};
use crate::proposal::{Proposal, StrategyProposal};
use crate::reasoner::{ReasonContext, Reasoner};

pub struct StrategyAgent {
    reasoner: Arc<dyn Reasoner>,
    session_id: String,
    round: AtomicU64,
}

impl StrategyAgent {
    pub fn new(reasoner: Arc<dyn Reasoner>, session_id: impl Into<String>) -> Self {
        Self {
            reasoner,
            session_id: session_id.into(),
            round: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AgentHandler for StrategyAgent {
    fn role(&self) -> Role {
        Role::Strategy
    }

    fn subscriptions(&self) -> Vec<String> {
        vec!["market.*".to_string(), "debate.round.*".to_string()]
    }

    async fn handle(&self, msg: &Message, bus: &AgentNetwork) -> Result<(), AppError> {
        let (data, topic) = match &msg.payload {
            Proposal::MarketSnapshot(snapshot) => (
                json!({
                    "kind": "market_snapshot",
                    "quotes": snapshot.quotes,
                    "regime": snapshot.regime,
                }),
                "proposal.strategy",
            ),
            Proposal::DebateRoundRequest(req) => match &req.amend_text {
                // A round re-opened by a user amendment: the user's text is
                // appended to context and the revision is published on its
                // own topic so Risk can tell it apart from a fresh proposal.
                Some(amend_text) => (
                    json!({
                        "kind": "debate_round_request",
                        "round": req.round,
                        "amend_text": amend_text,
                    }),
                    "proposal.amend",
                ),
                None => (
                    json!({
                        "kind": "debate_round_request",
                        "round": req.round,
                    }),
                    "proposal.strategy",
                ),
            },
            _ => return Ok(()),
        };

        let round = self.round.fetch_add(1, Ordering::Relaxed);
        let ctx = ReasonContext {
            session_id: self.session_id.clone(),
            data,
        };
        let result = self.reasoner.reason(Role::Strategy, "strategy.propose", &ctx).await?;

        let proposal: StrategyProposal = serde_json::from_value(result.value).map_err(|e| {
            AppError::SchemaViolation {
                role: "strategy".to_string(),
                detail: e.to_string(),
            }
        })?;

        bus.publish(
            Role::Strategy,
            Destination::All,
            topic,
            Proposal::ProposalStrategy(proposal),
            Some(msg.id),
        );
        let _ = round;
        Ok(())
    }
}
