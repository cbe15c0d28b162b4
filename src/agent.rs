//! Agent Runtime (C4): wires a per-role handler to the message bus, runs
//! its receive loop, and tracks its performance metrics. A single
//! `Agent { role, subscriptions, handler, metrics }` record is enough —
//! every role specializes `AgentHandler`, not the runtime around it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::bus::{AgentNetwork, Subscription};
use crate::error::AppError;
use crate::message::{Destination, Message, Role};
use crate::metrics::AgentMetrics;
use crate::proposal::{AgentErrorPayload, Proposal};

/// A role's reaction to a single incoming message: publish zero or more
/// follow-on messages (or none, if the message isn't actionable for it).
#[async_trait]
pub trait AgentHandler: Send + Sync {
    fn role(&self) -> Role;

    /// Topic patterns this role subscribes to (e.g. `market.*`).
    fn subscriptions(&self) -> Vec<String>;

    async fn handle(&self, msg: &Message, bus: &AgentNetwork) -> Result<(), AppError>;
}

/// How many consecutive handler failures an agent tolerates before its
/// runtime loop gives up and returns, leaving the orchestrator to decide
/// the session's fate.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub struct Agent {
    pub handler: Arc<dyn AgentHandler>,
    pub metrics: Arc<AgentMetrics>,
    max_consecutive_failures: u32,
}

impl Agent {
    pub fn new(handler: Arc<dyn AgentHandler>) -> Self {
        Self {
            handler,
            metrics: Arc::new(AgentMetrics::new()),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Runs the receive loop until every subscription's channel closes or
    /// the consecutive-failure budget is exhausted.
    pub async fn run(&self, bus: Arc<AgentNetwork>) {
        let role = self.handler.role();
        let mut subs: Vec<_> = self
            .handler
            .subscriptions()
            .into_iter()
            .map(|pattern| bus.subscribe(role, pattern))
            .collect();

        if subs.is_empty() {
            warn!(%role, "agent has no subscriptions, runtime loop exiting immediately");
            return;
        }

        let mut consecutive_failures = 0u32;
        loop {
            let recv_futures = subs.iter_mut().map(|s| Box::pin(s.rx.recv()));
            let (received, _idx, _rest) = futures_util::future::select_all(recv_futures).await;

            let Some(msg) = received else {
                // One subscription's channel closed; since all subscriptions
                // share the same bus lifetime, treat this as shutdown.
                return;
            };

            let start = Instant::now();
            match self.handler.handle(&msg, &bus).await {
                Ok(()) => {
                    consecutive_failures = 0;
                    self.metrics.record_success(start.elapsed());
                }
                Err(err) => {
                    consecutive_failures += 1;
                    self.metrics.record_failure(start.elapsed(), &err);
                    bus.publish(
                        role,
                        Destination::All,
                        "agent.error",
                        Proposal::AgentError(AgentErrorPayload {
                            role: role.to_string(),
                            kind: err.kind(),
                            message: err.to_string(),
                        }),
                        Some(msg.id),
                    );
                    if consecutive_failures >= self.max_consecutive_failures {
                        let repeated = AppError::RepeatedAgentFailure {
                            role: role.to_string(),
                            count: consecutive_failures,
                        };
                        error!(%role, failures = consecutive_failures, "agent exceeded retry budget, entering degraded state");
                        // Distinct from the per-attempt `agent.error` above:
                        // this is the budget-exhaustion escalation the
                        // orchestrator watches for on debate-critical roles.
                        bus.publish(
                            role,
                            Destination::All,
                            "agent.repeated_failure",
                            Proposal::AgentError(AgentErrorPayload {
                                role: role.to_string(),
                                kind: repeated.kind(),
                                message: repeated.to_string(),
                            }),
                            Some(msg.id),
                        );
                        self.run_degraded(subs).await;
                        return;
                    }
                }
            }
        }
    }

    /// Entered once an agent exceeds its consecutive-failure budget: per
    /// the degraded-agent contract it stops producing proposals but keeps
    /// draining its subscriptions so publishers never back up against a
    /// dead end, until the bus itself shuts down.
    async fn run_degraded(&self, mut subs: Vec<Subscription>) {
        loop {
            let recv_futures = subs.iter_mut().map(|s| Box::pin(s.rx.recv()));
            let (received, _idx, _rest) = futures_util::future::select_all(recv_futures).await;
            if received.is_none() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{MarketSnapshot, Proposal as P};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: AtomicU32,
        fail_first_n: u32,
    }

    #[async_trait]
    impl AgentHandler for CountingHandler {
        fn role(&self) -> Role {
            Role::Strategy
        }

        fn subscriptions(&self) -> Vec<String> {
            vec!["market.*".to_string()]
        }

        async fn handle(&self, _msg: &Message, _bus: &AgentNetwork) -> Result<(), AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(AppError::Upstream("simulated failure".into()))
            } else {
                Ok(())
            }
        }
    }

    fn snapshot_msg() -> P {
        P::MarketSnapshot(MarketSnapshot {
            quotes: Default::default(),
            regime: "normal".into(),
        })
    }

    #[tokio::test]
    async fn agent_enters_degraded_state_after_consecutive_failure_budget() {
        use std::time::Duration;

        let bus = AgentNetwork::new("s1");
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 100,
        });
        let agent = Agent::new(handler.clone()).with_max_consecutive_failures(3);

        let run_bus = bus.clone();
        let run_handle = tokio::spawn(async move {
            agent.run(run_bus).await;
        });

        for _ in 0..3 {
            bus.publish(Role::Market, Destination::All, "market.snapshot", snapshot_msg(), None);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

        // Degraded: further messages are still drained (no backpressure
        // drop) but never reach the handler again.
        for _ in 0..5 {
            bus.publish(Role::Market, Destination::All, "market.snapshot", snapshot_msg(), None);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(bus.slow_subscriber_events().is_empty());

        run_handle.abort();
    }
}
