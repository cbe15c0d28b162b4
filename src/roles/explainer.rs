//! Explainer role: narrates proposals, verdicts, and outcomes in plain
//! language for the user-facing stream.

use async_trait::async_trait;

use crate::agent::AgentHandler;
use crate::bus::AgentNetwork;
use crate::error::AppError;
use crate::message::{Destination, Message, Role};
use crate::proposal::{Narration, OrderStatus, Proposal};

pub struct ExplainerAgent;

impl ExplainerAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExplainerAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn narrate(payload: &Proposal) -> Option<String> {
    match payload {
        Proposal::ProposalStrategy(p) => Some(format!(
            "Strategy proposes: {} (confidence {:.0}%)",
            p.rationale,
            p.confidence * 100.0
        )),
        Proposal::ProposalRiskVerdict(v) if v.approved => Some(format!(
            "Risk approved the proposal: VaR95={:.2}%, ES={:.2}%",
            v.var_95 * 100.0,
            v.expected_shortfall * 100.0
        )),
        Proposal::ProposalRiskVerdict(v) => Some(format!(
            "Risk rejected the proposal: {}",
            v.violations.join("; ")
        )),
        Proposal::DebateApproved(r) => Some(format!("Debate round {} approved the plan.", r.round)),
        Proposal::DebateRejected(r) => Some(format!(
            "Debate round {} rejected the plan: {}",
            r.round,
            r.reason_chain.join(" -> ")
        )),
        Proposal::OrderResult(o) => match o.status {
            OrderStatus::Filled => Some(format!(
                "Order {} filled at {:.2}",
                o.intent_id,
                o.fill_price.unwrap_or_default()
            )),
            OrderStatus::Rejected => Some(format!(
                "Order {} rejected: {}",
                o.intent_id,
                o.reason.clone().unwrap_or_default()
            )),
            OrderStatus::Failed => Some(format!(
                "Order {} failed: {}",
                o.intent_id,
                o.reason.clone().unwrap_or_default()
            )),
        },
        _ => None,
    }
}

#[async_trait]
impl AgentHandler for ExplainerAgent {
    fn role(&self) -> Role {
        Role::Explainer
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![
            "proposal.strategy".to_string(),
            "proposal.risk_verdict".to_string(),
            "debate.approved".to_string(),
            "debate.rejected".to_string(),
            "order.result".to_string(),
        ]
    }

    async fn handle(&self, msg: &Message, bus: &AgentNetwork) -> Result<(), AppError> {
        if let Some(text) = narrate(&msg.payload) {
            bus.publish(
                Role::Explainer,
                Destination::Role(Role::User),
                "narration",
                Proposal::Narration(Narration { text }),
                Some(msg.id),
            );
        }
        Ok(())
    }
}
