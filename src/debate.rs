//! Debate / Consensus Engine (C5): advances a round-based state machine
//! from a gathered `(StrategyProposal, RiskVerdict)` pair to an
//! Approved/Rejected outcome, with Paused/Failed as states reachable from
//! anywhere rather than steps in the happy path.
//!
//! Transition rules:
//! 1. `Gathering` -> `Deliberating` once both a strategy proposal and a
//!    risk verdict have arrived for the current round.
//! 2. `Deliberating` -> `Deciding` once the consensus score has been
//!    computed for the round (deliberation itself takes no further input).
//! 3. `Deciding` -> `Approved` if the risk verdict approved and the
//!    consensus score meets `consensus_threshold`.
//! 4. `Deciding` -> `Gathering` (next round) if not approved and
//!    `round < max_rounds`, emitting a `DebateRoundRequest` for a revised
//!    proposal.
//! 5. `Deciding` -> `Rejected` if not approved and `round >= max_rounds`.
//! 6. Any non-terminal state -> `Paused` on a `Hold` intervention; `Paused`
//!    -> the state it was holding on a subsequent `Approve`/resume signal.
//! 7. `Paused` -> `Rejected` on a `Reject` intervention; any state ->
//!    `Failed` on a reported `DebateEngineFailure`.

use crate::proposal::{
    DebateOutcome, DebateResult, DebateRoundRequest, InterventionKind, Proposal, RiskVerdict, StrategyProposal,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DebateState {
    Gathering,
    Deliberating,
    Deciding,
    Approved,
    Rejected,
    Paused { resume_to: Box<DebateState> },
    Failed,
}

/// What the engine wants published as a result of processing an input.
/// `Finish` carries the bus message id of the risk verdict that decided the
/// round, if one arrived, so the orchestrator can chain the terminal
/// `debate.approved`/`debate.rejected` message's `causation_id` back to it.
#[derive(Debug, Clone, PartialEq)]
pub enum DebateAction {
    RequestNextRound(DebateRoundRequest),
    Finish(DebateResult, Option<u64>),
    None,
}

pub struct DebateEngine {
    round: u32,
    max_rounds: u32,
    consensus_threshold: f64,
    state: DebateState,
    current_proposal: Option<StrategyProposal>,
    current_verdict: Option<RiskVerdict>,
    verdict_msg_id: Option<u64>,
    reason_chain: Vec<String>,
}

impl DebateEngine {
    pub fn new(max_rounds: u32, consensus_threshold: f64) -> Self {
        Self {
            round: 1,
            max_rounds,
            consensus_threshold,
            state: DebateState::Gathering,
            current_proposal: None,
            current_verdict: None,
            verdict_msg_id: None,
            reason_chain: Vec::new(),
        }
    }

    pub fn state(&self) -> &DebateState {
        &self.state
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// `confidence_of_strategy * (1 if risk_approved else 0)`.
    pub fn consensus_score(proposal: &StrategyProposal, verdict: &RiskVerdict) -> f64 {
        let risk_component = if verdict.approved { 1.0 } else { 0.0 };
        proposal.confidence.clamp(0.0, 1.0) * risk_component
    }

    pub fn pause(&mut self) {
        if !matches!(self.state, DebateState::Paused { .. } | DebateState::Approved | DebateState::Rejected | DebateState::Failed) {
            let resume_to = Box::new(self.state.clone());
            self.state = DebateState::Paused { resume_to };
        }
    }

    pub fn fail(&mut self, reason: String) {
        self.reason_chain.push(reason);
        self.state = DebateState::Failed;
    }

    /// Feeds a single bus message's payload into the state machine,
    /// returning whatever action (if any) the orchestrator must publish.
    /// `msg_id` is the bus id of the message carrying `payload`, retained
    /// when it is the risk verdict so the eventual terminal message can
    /// chain its `causation_id` back to it.
    pub fn on_payload(&mut self, msg_id: u64, payload: &Proposal) -> DebateAction {
        match payload {
            Proposal::UserIntervention(intervention) => match intervention.kind {
                InterventionKind::Hold => {
                    self.pause();
                    DebateAction::None
                }
                InterventionKind::Approve => {
                    if let DebateState::Paused { resume_to } = &self.state {
                        self.state = (**resume_to).clone();
                    }
                    DebateAction::None
                }
                InterventionKind::Reject => {
                    self.state = DebateState::Rejected;
                    self.reason_chain.push("rejected by user intervention".to_string());
                    DebateAction::Finish(self.finish(DebateOutcome::Rejected), self.verdict_msg_id)
                }
                InterventionKind::Amend => {
                    if matches!(
                        self.state,
                        DebateState::Gathering | DebateState::Deliberating | DebateState::Deciding
                    ) {
                        self.current_proposal = None;
                        self.current_verdict = None;
                        self.verdict_msg_id = None;
                        self.state = DebateState::Gathering;
                        self.reason_chain
                            .push(format!("round {}: re-opened by user amendment", self.round));
                        DebateAction::RequestNextRound(DebateRoundRequest {
                            round: self.round,
                            amend_text: Some(intervention.text.clone()),
                        })
                    } else {
                        DebateAction::None
                    }
                }
            },
            Proposal::ProposalStrategy(proposal) if self.state == DebateState::Gathering => {
                self.current_proposal = Some(proposal.clone());
                self.advance_gathering();
                DebateAction::None
            }
            Proposal::ProposalRiskVerdict(verdict) if self.state == DebateState::Gathering => {
                self.current_verdict = Some(verdict.clone());
                self.verdict_msg_id = Some(msg_id);
                self.advance_gathering();
                DebateAction::None
            }
            _ => DebateAction::None,
        }
    }

    fn advance_gathering(&mut self) {
        if self.state != DebateState::Gathering {
            return;
        }
        if self.current_proposal.is_some() && self.current_verdict.is_some() {
            self.state = DebateState::Deliberating;
        }
    }

    /// Called when `round_timeout` elapses while still `Gathering`: the
    /// missing role's silence counts as an objection and the round is
    /// resolved with whatever arrived, per the round-bound rule.
    pub fn on_round_timeout(&mut self) -> DebateAction {
        if self.state != DebateState::Gathering {
            return DebateAction::None;
        }
        if self.current_proposal.is_none() {
            self.reason_chain
                .push(format!("round {}: objection: timeout (strategy)", self.round));
        }
        if self.current_verdict.is_none() {
            self.reason_chain
                .push(format!("round {}: objection: timeout (risk)", self.round));
        }

        if self.round >= self.max_rounds {
            self.state = DebateState::Rejected;
            return DebateAction::Finish(self.finish(DebateOutcome::Rejected), self.verdict_msg_id);
        }

        self.round += 1;
        self.state = DebateState::Gathering;
        self.current_proposal = None;
        self.current_verdict = None;
        self.verdict_msg_id = None;
        DebateAction::RequestNextRound(DebateRoundRequest { round: self.round, amend_text: None })
    }

    /// Called when `deliberation_window` elapses with no new messages
    /// while `Deliberating`: moves to `Deciding` and resolves the round.
    pub fn on_deliberation_quiet(&mut self) -> DebateAction {
        if self.state != DebateState::Deliberating {
            return DebateAction::None;
        }
        self.state = DebateState::Deciding;
        self.decide()
    }

    /// Once in `Deciding`, resolves the round to `Approved`, a next-round
    /// request, or `Rejected`. Call after `on_deliberation_quiet` brings
    /// the engine into `Deciding`.
    pub fn decide(&mut self) -> DebateAction {
        if self.state != DebateState::Deciding {
            return DebateAction::None;
        }
        let (Some(proposal), Some(verdict)) = (self.current_proposal.clone(), self.current_verdict.clone()) else {
            return DebateAction::None;
        };
        let score = Self::consensus_score(&proposal, &verdict);
        self.reason_chain.push(format!(
            "round {}: consensus_score={:.2}, risk_approved={}",
            self.round, score, verdict.approved
        ));

        if verdict.approved && score >= self.consensus_threshold {
            self.state = DebateState::Approved;
            return DebateAction::Finish(self.finish(DebateOutcome::Approved), self.verdict_msg_id);
        }

        if self.round >= self.max_rounds {
            self.state = DebateState::Rejected;
            return DebateAction::Finish(self.finish(DebateOutcome::Rejected), self.verdict_msg_id);
        }

        self.round += 1;
        self.state = DebateState::Gathering;
        self.current_proposal = None;
        self.current_verdict = None;
        self.verdict_msg_id = None;
        DebateAction::RequestNextRound(DebateRoundRequest { round: self.round, amend_text: None })
    }

    fn finish(&self, outcome: DebateOutcome) -> DebateResult {
        DebateResult {
            round: self.round,
            outcome,
            reason_chain: self.reason_chain.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn proposal(confidence: f64) -> StrategyProposal {
        StrategyProposal {
            allocations: BTreeMap::from([("AAPL".to_string(), 0.2), ("cash".to_string(), 0.8)]),
            rationale: "test".into(),
            confidence,
        }
    }

    fn verdict(approved: bool) -> RiskVerdict {
        RiskVerdict {
            approved,
            var_95: 0.1,
            expected_shortfall: 0.15,
            violations: if approved { vec![] } else { vec!["max_drawdown".into()] },
            rationale: "test".into(),
            es_sample_floor: false,
        }
    }

    #[test]
    fn consensus_score_is_confidence_gated_by_risk_approval() {
        assert_eq!(DebateEngine::consensus_score(&proposal(0.8), &verdict(true)), 0.8);
        assert_eq!(DebateEngine::consensus_score(&proposal(0.8), &verdict(false)), 0.0);
    }

    #[test]
    fn high_confidence_and_approved_verdict_reaches_approved() {
        let mut engine = DebateEngine::new(3, 0.7);
        engine.on_payload(10, &Proposal::ProposalStrategy(proposal(0.9)));
        engine.on_payload(11, &Proposal::ProposalRiskVerdict(verdict(true)));
        assert_eq!(*engine.state(), DebateState::Deliberating);
        let action = engine.on_deliberation_quiet();
        assert!(
            matches!(&action, DebateAction::Finish(r, causation_id) if r.outcome == DebateOutcome::Approved && *causation_id == Some(11))
        );
    }

    #[test]
    fn rejected_verdict_requests_another_round_until_bound() {
        let mut engine = DebateEngine::new(2, 0.7);
        engine.on_payload(10, &Proposal::ProposalStrategy(proposal(0.9)));
        engine.on_payload(11, &Proposal::ProposalRiskVerdict(verdict(false)));
        let action = engine.on_deliberation_quiet();
        assert!(matches!(action, DebateAction::RequestNextRound(r) if r.round == 2));
        assert_eq!(engine.round(), 2);

        engine.on_payload(20, &Proposal::ProposalStrategy(proposal(0.9)));
        engine.on_payload(21, &Proposal::ProposalRiskVerdict(verdict(false)));
        let action = engine.on_deliberation_quiet();
        assert!(
            matches!(&action, DebateAction::Finish(r, causation_id) if r.outcome == DebateOutcome::Rejected && *causation_id == Some(21))
        );
    }

    #[test]
    fn round_timeout_counts_missing_role_as_objection_and_advances() {
        let mut engine = DebateEngine::new(2, 0.7);
        engine.on_payload(10, &Proposal::ProposalStrategy(proposal(0.9)));
        // Risk verdict never arrives for this round.
        let action = engine.on_round_timeout();
        assert!(matches!(action, DebateAction::RequestNextRound(r) if r.round == 2));
        assert!(engine.reason_chain.iter().any(|r| r.contains("timeout (risk)")));

        let action = engine.on_round_timeout();
        assert!(matches!(action, DebateAction::Finish(r, None) if r.outcome == DebateOutcome::Rejected));
    }

    #[test]
    fn amend_reopens_a_deliberating_round_with_user_text() {
        let mut engine = DebateEngine::new(3, 0.7);
        engine.on_payload(10, &Proposal::ProposalStrategy(proposal(0.9)));
        engine.on_payload(11, &Proposal::ProposalRiskVerdict(verdict(true)));
        assert_eq!(*engine.state(), DebateState::Deliberating);

        let action = engine.on_payload(
            12,
            &Proposal::UserIntervention(crate::proposal::UserIntervention {
                kind: InterventionKind::Amend,
                text: "trim AAPL to half size".into(),
                target_proposal_id: None,
            }),
        );
        assert_eq!(*engine.state(), DebateState::Gathering);
        // Amending re-opens the same round rather than advancing it.
        assert_eq!(engine.round(), 1);
        assert!(
            matches!(&action, DebateAction::RequestNextRound(r) if r.round == 1 && r.amend_text.as_deref() == Some("trim AAPL to half size"))
        );

        // The round only resolves once a fresh strategy/risk pair arrives.
        let action = engine.on_payload(13, &Proposal::ProposalStrategy(proposal(0.8)));
        assert_eq!(action, DebateAction::None);
        let action = engine.on_payload(14, &Proposal::ProposalRiskVerdict(verdict(true)));
        assert_eq!(action, DebateAction::None);
        assert_eq!(*engine.state(), DebateState::Deliberating);
    }

    #[test]
    fn hold_pauses_and_approve_resumes() {
        let mut engine = DebateEngine::new(3, 0.7);
        engine.on_payload(10, &Proposal::ProposalStrategy(proposal(0.9)));
        assert_eq!(*engine.state(), DebateState::Gathering);
        engine.on_payload(
            11,
            &Proposal::UserIntervention(crate::proposal::UserIntervention {
                kind: InterventionKind::Hold,
                text: "wait".into(),
                target_proposal_id: None,
            }),
        );
        assert!(matches!(engine.state(), DebateState::Paused { .. }));

        engine.on_payload(
            12,
            &Proposal::UserIntervention(crate::proposal::UserIntervention {
                kind: InterventionKind::Approve,
                text: "go".into(),
                target_proposal_id: None,
            }),
        );
        assert_eq!(*engine.state(), DebateState::Gathering);
    }

    #[test]
    fn reject_intervention_ends_the_session() {
        let mut engine = DebateEngine::new(3, 0.7);
        let action = engine.on_payload(
            10,
            &Proposal::UserIntervention(crate::proposal::UserIntervention {
                kind: InterventionKind::Reject,
                text: "no".into(),
                target_proposal_id: None,
            }),
        );
        assert_eq!(*engine.state(), DebateState::Rejected);
        assert!(matches!(action, DebateAction::Finish(r, None) if r.outcome == DebateOutcome::Rejected));
    }
}
