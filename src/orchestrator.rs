//! Session Orchestrator (C6): owns a session's message bus, its agent
//! tasks, and the Debate Engine that ties their output together. Sessions
//! are isolated from one another — each gets its own `AgentNetwork` and
//! task set, so one session's failure never touches another's.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::broker::BrokerAdapter;
use crate::bus::AgentNetwork;
use crate::config::AppConfig;
use crate::debate::{DebateAction, DebateEngine, DebateState};
use crate::error::ErrorKind;
use crate::message::{Destination, Role};
use crate::portfolio::{MarketStats, Portfolio};
use crate::proposal::{AgentErrorPayload, InterventionKind, Proposal, UserIntervention};
use crate::reasoner::Reasoner;
use crate::roles::{ExecutorAgent, ExplainerAgent, MarketAgent, RiskAgent, StrategyAgent, UserAgent};

/// Roles whose output the debate cannot proceed without: a repeated
/// failure on either one fails the whole session rather than merely
/// degrading one participant.
fn role_is_debate_critical(role: &str) -> bool {
    matches!(role, "strategy" | "risk")
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Running,
    Paused,
    Stopped,
    /// Debate Engine crashed, or the agent failure budget was exhausted
    /// on a role whose output the session cannot proceed without.
    Failed(String),
    Finished(crate::proposal::DebateOutcome),
}

pub struct Session {
    pub id: String,
    bus: Arc<AgentNetwork>,
    debate: Arc<Mutex<DebateEngine>>,
    status: Arc<RwLock<SessionStatus>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    agent_metrics: HashMap<Role, Arc<crate::metrics::AgentMetrics>>,
}

impl Session {
    pub fn bus(&self) -> Arc<AgentNetwork> {
        self.bus.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    /// Read-only per-agent performance snapshot (§4.4): calls, failures,
    /// p50/p95/p99/p999 latency, and the last error, one per role with a
    /// running agent task.
    pub fn agent_metrics(&self, role: Role) -> Option<crate::metrics::AgentMetricsSnapshot> {
        self.agent_metrics.get(&role).map(|m| m.snapshot(&role.to_string()))
    }

    /// Snapshot across every role this session spawned an agent for.
    pub fn all_agent_metrics(&self) -> Vec<crate::metrics::AgentMetricsSnapshot> {
        self.agent_metrics.iter().map(|(role, m)| m.snapshot(&role.to_string())).collect()
    }

    pub fn history(&self, since_msg_id: Option<u64>) -> Vec<crate::message::Message> {
        self.bus.history(since_msg_id)
    }

    fn publish_intervention(&self, kind: InterventionKind, text: &str) {
        self.bus.publish(
            Role::User,
            Destination::All,
            "user.intervention",
            Proposal::UserIntervention(UserIntervention {
                kind,
                text: text.to_string(),
                target_proposal_id: None,
            }),
            None,
        );
    }

    /// Pauses the session: a `Hold` intervention reaches the debate
    /// coordinator, which parks the state machine without losing it.
    pub fn pause(&self) {
        if *self.status.read() == SessionStatus::Running {
            self.publish_intervention(InterventionKind::Hold, "session paused");
            *self.status.write() = SessionStatus::Paused;
        }
    }

    pub fn resume(&self) {
        if *self.status.read() == SessionStatus::Paused {
            self.publish_intervention(InterventionKind::Approve, "session resumed");
            *self.status.write() = SessionStatus::Running;
        }
    }

    /// Rejects the in-flight debate round and ends the session immediately
    /// by aborting every agent task.
    pub fn stop(&self) {
        self.publish_intervention(InterventionKind::Reject, "session stopped by caller");
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        *self.status.write() = SessionStatus::Stopped;
    }
}

/// Drives the Debate Engine off the bus: collects `proposal.*` payloads,
/// watches for fatal agent degradation, and enforces the two timers from
/// the round-based state machine (`round_timeout` while `Gathering`,
/// `deliberation_window` of quiet while `Deliberating`). Timers are
/// suspended while the engine reports `Paused` so a held session never
/// times out under the user.
async fn run_debate_coordinator(
    bus: Arc<AgentNetwork>,
    debate: Arc<Mutex<DebateEngine>>,
    status: Arc<RwLock<SessionStatus>>,
    round_timeout: Duration,
    deliberation_window: Duration,
) {
    let mut proposals = bus.subscribe(Role::Orchestrator, "proposal.*");
    let mut interventions = bus.subscribe(Role::Orchestrator, "user.intervention");
    let mut agent_errors = bus.subscribe(Role::Orchestrator, "agent.repeated_failure");

    let mut round_deadline = Instant::now() + round_timeout;

    loop {
        let timer_state = debate.lock().state().clone();
        let deadline = match timer_state {
            DebateState::Gathering => Some(round_deadline),
            DebateState::Deliberating => Some(Instant::now() + deliberation_window),
            _ => None,
        };

        enum Event {
            Message(Option<crate::message::Message>),
            RoundTimedOut,
            DeliberationQuiet,
        }

        let event = match deadline {
            Some(deadline) => tokio::select! {
                m = proposals.rx.recv() => Event::Message(m),
                m = interventions.rx.recv() => Event::Message(m),
                m = agent_errors.rx.recv() => Event::Message(m),
                _ = tokio::time::sleep_until(deadline) => {
                    if timer_state == DebateState::Gathering {
                        Event::RoundTimedOut
                    } else {
                        Event::DeliberationQuiet
                    }
                }
            },
            None => tokio::select! {
                m = proposals.rx.recv() => Event::Message(m),
                m = interventions.rx.recv() => Event::Message(m),
                m = agent_errors.rx.recv() => Event::Message(m),
            },
        };

        let (action, causation_id) = match event {
            Event::Message(None) => {
                warn!("debate coordinator's bus subscriptions closed, exiting");
                return;
            }
            Event::Message(Some(msg)) => {
                if let Proposal::AgentError(AgentErrorPayload { role, kind, message }) = &msg.payload {
                    if *kind == ErrorKind::Fatal && role_is_debate_critical(role) {
                        error!(%role, %message, "debate-critical agent failed, failing session");
                        debate.lock().fail(format!("agent.repeated_failure: {message}"));
                        bus.publish(
                            Role::Orchestrator,
                            Destination::All,
                            "session.failed",
                            Proposal::AgentError(AgentErrorPayload {
                                role: role.clone(),
                                kind: ErrorKind::Fatal,
                                message: "agent.repeated_failure".to_string(),
                            }),
                            Some(msg.id),
                        );
                        *status.write() = SessionStatus::Failed("agent.repeated_failure".to_string());
                        return;
                    }
                    continue;
                }

                let action = {
                    let mut engine = debate.lock();
                    let before_round = engine.round();
                    let was_gathering = matches!(engine.state(), DebateState::Gathering);
                    let action = engine.on_payload(msg.id, &msg.payload);
                    let entered_gathering = !was_gathering && matches!(engine.state(), DebateState::Gathering);
                    if before_round != engine.round() || entered_gathering {
                        // A fresh round, a resume back into Gathering (whose
                        // timer was frozen for the duration of a pause), or a
                        // round re-opened by a user amendment all get a full
                        // new round_timeout window.
                        round_deadline = Instant::now() + round_timeout;
                    }
                    action
                };
                (action, Some(msg.id))
            }
            Event::RoundTimedOut => {
                let action = debate.lock().on_round_timeout();
                round_deadline = Instant::now() + round_timeout;
                (action, None)
            }
            Event::DeliberationQuiet => {
                let action = debate.lock().on_deliberation_quiet();
                (action, None)
            }
        };

        match action {
            DebateAction::RequestNextRound(req) => {
                bus.publish(
                    Role::Orchestrator,
                    Destination::All,
                    "debate.round.request",
                    Proposal::DebateRoundRequest(req),
                    causation_id,
                );
            }
            DebateAction::Finish(result, verdict_causation_id) => {
                let outcome = result.outcome;
                let topic = match outcome {
                    crate::proposal::DebateOutcome::Approved => "debate.approved",
                    crate::proposal::DebateOutcome::Rejected => "debate.rejected",
                };
                let payload = match outcome {
                    crate::proposal::DebateOutcome::Approved => Proposal::DebateApproved(result),
                    crate::proposal::DebateOutcome::Rejected => Proposal::DebateRejected(result),
                };
                // Chain back to the risk verdict that decided the round (per
                // the causal-chain invariant) rather than to whatever event
                // happened to trigger this tick of the coordinator.
                bus.publish(Role::Orchestrator, Destination::All, topic, payload, verdict_causation_id);
                *status.write() = SessionStatus::Finished(outcome);
            }
            DebateAction::None => {}
        }
    }
}

/// Builds and starts every role agent plus the debate coordinator for a
/// new session, wiring them to a freshly created `AgentNetwork`.
pub struct Orchestrator {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start_session(
        &self,
        session_id: impl Into<String>,
        config: &AppConfig,
        reasoner: Arc<dyn Reasoner>,
        broker: Arc<dyn BrokerAdapter>,
        portfolio: Portfolio,
        market_stats: MarketStats,
    ) -> Arc<Session> {
        let session_id = session_id.into();
        let bus = AgentNetwork::new(session_id.clone());
        let debate = Arc::new(Mutex::new(DebateEngine::new(
            config.debate.max_rounds,
            config.debate.consensus_threshold,
        )));
        let status = Arc::new(RwLock::new(SessionStatus::Running));

        let mut handles = Vec::new();
        let mut agent_metrics = HashMap::new();

        let market_agent = Arc::new(MarketAgent::default());
        let (handle, metrics) = spawn_agent(market_agent, bus.clone());
        handles.push(handle);
        agent_metrics.insert(Role::Market, metrics);

        let gated_reasoner: Arc<dyn Reasoner> = Arc::new(crate::reasoner::ConcurrencyLimitedReasoner::new(
            reasoner.clone(),
            config.reasoner.concurrency,
        ));
        let strategy_agent = Arc::new(StrategyAgent::new(gated_reasoner, session_id.clone()));
        let (handle, metrics) = spawn_agent(strategy_agent, bus.clone());
        handles.push(handle);
        agent_metrics.insert(Role::Strategy, metrics);

        let risk_agent = Arc::new(RiskAgent::new(
            portfolio.clone(),
            market_stats,
            crate::portfolio::RiskConstraints {
                max_position_weight: config.risk.max_position_weight,
                max_drawdown: config.risk.max_drawdown,
                min_cash_ratio: config.risk.min_cash_ratio,
                max_concentration_hhi: config.risk.max_concentration_hhi,
            },
            config.risk.simulation_paths,
            config.risk.confidence_alpha,
            0,
        ));
        let (handle, metrics) = spawn_agent(risk_agent, bus.clone());
        handles.push(handle);
        agent_metrics.insert(Role::Risk, metrics);

        let executor_agent = Arc::new(ExecutorAgent::new(broker, portfolio));
        let (handle, metrics) = spawn_agent(executor_agent, bus.clone());
        handles.push(handle);
        agent_metrics.insert(Role::Executor, metrics);

        let explainer_agent = Arc::new(ExplainerAgent::new());
        let (handle, metrics) = spawn_agent(explainer_agent, bus.clone());
        handles.push(handle);
        agent_metrics.insert(Role::Explainer, metrics);

        let user_agent = Arc::new(UserAgent::new());
        let (handle, metrics) = spawn_agent(user_agent, bus.clone());
        handles.push(handle);
        agent_metrics.insert(Role::User, metrics);

        let debate_bus = bus.clone();
        let debate_for_task = debate.clone();
        let status_for_task = status.clone();
        let round_timeout = Duration::from_secs(config.debate.round_timeout_sec);
        let deliberation_window = Duration::from_secs(config.debate.deliberation_window_sec);
        handles.push(tokio::spawn(async move {
            run_debate_coordinator(
                debate_bus,
                debate_for_task,
                status_for_task,
                round_timeout,
                deliberation_window,
            )
            .await;
        }));

        let session = Arc::new(Session {
            id: session_id.clone(),
            bus,
            debate,
            status,
            handles: Mutex::new(handles),
            agent_metrics,
        });

        self.sessions.write().insert(session_id, session.clone());
        session
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn stop_session(&self, session_id: &str) {
        if let Some(session) = self.sessions.write().remove(session_id) {
            session.stop();
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns an agent's receive loop and hands back its metrics handle
/// alongside the task so the orchestrator's control surface can expose a
/// read-only snapshot without reaching into the (moved) task.
fn spawn_agent(
    handler: Arc<dyn crate::agent::AgentHandler>,
    bus: Arc<AgentNetwork>,
) -> (JoinHandle<()>, Arc<crate::metrics::AgentMetrics>) {
    let role = handler.role();
    let agent = Agent::new(handler);
    let metrics = agent.metrics.clone();
    let handle = tokio::spawn(async move {
        agent.run(bus).await;
        info!(%role, "agent task exited");
    });
    (handle, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::StubReasoner;
    use crate::broker::MockBroker;
    use serde_json::json;
    use std::time::Duration;

    fn stats() -> MarketStats {
        MarketStats {
            symbols: vec!["AAPL".into()],
            mean_returns: vec![0.0003],
            cov_matrix: vec![0.0002],
            horizon_days: 5,
        }
    }

    /// Default config with the deliberation window collapsed to zero so
    /// unit tests using an instant stub reasoner don't pay the (real)
    /// 5-second quiet period before the engine decides.
    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.debate.deliberation_window_sec = 0;
        config
    }

    #[tokio::test]
    async fn session_reaches_approved_with_confident_stub() {
        let stub = Arc::new(StubReasoner::new());
        stub.stub_any(json!({
            "allocations": {"AAPL": 0.1, "cash": 0.9},
            "rationale": "cautious entry",
            "confidence": 0.95,
        }));
        let orchestrator = Orchestrator::new();
        let config = test_config();
        let session = orchestrator.start_session(
            "s1",
            &config,
            stub,
            Arc::new(MockBroker::new()),
            Portfolio::new(100_000.0),
            stats(),
        );

        session.bus().publish(
            Role::Market,
            crate::message::Destination::All,
            "market.snapshot",
            Proposal::MarketSnapshot(crate::proposal::MarketSnapshot {
                quotes: Default::default(),
                regime: "normal".into(),
            }),
            None,
        );

        let mut outcome = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let SessionStatus::Finished(o) = session.status() {
                outcome = Some(o);
                break;
            }
        }
        assert_eq!(outcome, Some(crate::proposal::DebateOutcome::Approved));

        // The control surface can read back each agent's performance
        // snapshot (calls/failures/latency percentiles) after the session
        // has produced at least one decision.
        let strategy_metrics = session.agent_metrics(Role::Strategy).expect("strategy agent has metrics");
        assert_eq!(strategy_metrics.calls, 1);
        assert_eq!(strategy_metrics.failures, 0);
        assert_eq!(session.all_agent_metrics().len(), 6);

        session.stop();
    }

    #[test]
    fn two_sessions_are_isolated() {
        let orchestrator = Orchestrator::new();
        let config = test_config();
        let a = orchestrator.start_session(
            "a",
            &config,
            Arc::new(StubReasoner::new()),
            Arc::new(MockBroker::new()),
            Portfolio::new(1_000.0),
            stats(),
        );
        let b = orchestrator.start_session(
            "b",
            &config,
            Arc::new(StubReasoner::new()),
            Arc::new(MockBroker::new()),
            Portfolio::new(1_000.0),
            stats(),
        );
        assert_ne!(a.bus().session_id(), b.bus().session_id());
        a.stop();
        b.stop();
    }
}
