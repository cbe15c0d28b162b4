//! Typed payload kinds carried by `Message`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    Hold,
    Amend,
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub quotes: BTreeMap<String, f64>,
    pub regime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProposal {
    pub allocations: BTreeMap<String, f64>,
    pub rationale: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub approved: bool,
    pub var_95: f64,
    pub expected_shortfall: f64,
    pub violations: Vec<String>,
    pub rationale: String,
    pub es_sample_floor: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub notional: f64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Filled,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub intent_id: String,
    pub status: OrderStatus,
    pub fill_price: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIntervention {
    pub kind: InterventionKind,
    pub text: String,
    pub target_proposal_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateOutcome {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRoundRequest {
    pub round: u32,
    /// Set when this round was re-opened by a `user.intervention.amend`:
    /// the user's text, to be appended to Strategy's reasoning context.
    pub amend_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub round: u32,
    pub outcome: DebateOutcome,
    pub reason_chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorPayload {
    pub role: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayBar {
    pub scenario_id: String,
    pub ts: i64,
    pub symbol: String,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

/// All payload kinds that can travel over the bus. `kind` is the
/// wire-exact discriminant enumerated in the envelope contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proposal {
    MarketSnapshot(MarketSnapshot),
    ProposalStrategy(StrategyProposal),
    ProposalRiskVerdict(RiskVerdict),
    OrderIntent(OrderIntent),
    OrderResult(OrderResult),
    Narration(Narration),
    UserIntervention(UserIntervention),
    DebateRoundRequest(DebateRoundRequest),
    DebateApproved(DebateResult),
    DebateRejected(DebateResult),
    AgentError(AgentErrorPayload),
    ReplayBar(ReplayBar),
}

impl Proposal {
    pub fn kind(&self) -> &'static str {
        match self {
            Proposal::MarketSnapshot(_) => "market.snapshot",
            Proposal::ProposalStrategy(_) => "proposal.strategy",
            Proposal::ProposalRiskVerdict(_) => "proposal.risk_verdict",
            Proposal::OrderIntent(_) => "order.intent",
            Proposal::OrderResult(_) => "order.result",
            Proposal::Narration(_) => "narration",
            Proposal::UserIntervention(_) => "user.intervention",
            Proposal::DebateRoundRequest(_) => "debate.round.request",
            Proposal::DebateApproved(_) => "debate.approved",
            Proposal::DebateRejected(_) => "debate.rejected",
            Proposal::AgentError(_) => "agent.error",
            Proposal::ReplayBar(_) => "replay.bar",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_through_json() {
        let original = Proposal::ProposalStrategy(StrategyProposal {
            allocations: BTreeMap::from([("AAPL".to_string(), 0.3)]),
            rationale: "momentum".to_string(),
            confidence: 0.9,
        });
        let json = serde_json::to_string(&original).unwrap();
        let parsed: Proposal = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
        assert_eq!(original.kind(), "proposal.strategy");
    }

    #[test]
    fn kind_tags_match_wire_contract() {
        assert_eq!(
            Proposal::OrderIntent(OrderIntent {
                id: "1".into(),
                symbol: "AAPL".into(),
                side: Side::Buy,
                qty: 1.0,
                notional: 100.0,
                order_type: OrderType::Market,
                limit_price: None,
            })
            .kind(),
            "order.intent"
        );
    }
}
