//! Risk role: runs every strategy proposal through the Monte Carlo risk
//! engine and publishes the resulting verdict.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agent::AgentHandler;
use crate::bus::AgentNetwork;
use crate::error::AppError;
use crate::message::{Destination, Message, Role};
use crate::portfolio::{MarketStats, Portfolio, RiskConstraints};
use crate::proposal::Proposal;
use crate::risk;

pub struct RiskAgent {
    portfolio: Mutex<Portfolio>,
    market_stats: Mutex<MarketStats>,
    constraints: RiskConstraints,
    n_paths: usize,
    confidence_alpha: f64,
    next_seed: AtomicU64,
}

impl RiskAgent {
    pub fn new(
        portfolio: Portfolio,
        market_stats: MarketStats,
        constraints: RiskConstraints,
        n_paths: usize,
        confidence_alpha: f64,
        base_seed: u64,
    ) -> Self {
        Self {
            portfolio: Mutex::new(portfolio),
            market_stats: Mutex::new(market_stats),
            constraints,
            n_paths,
            confidence_alpha,
            next_seed: AtomicU64::new(base_seed),
        }
    }

    pub fn update_market_stats(&self, market_stats: MarketStats) {
        *self.market_stats.lock() = market_stats;
    }
}

#[async_trait]
impl AgentHandler for RiskAgent {
    fn role(&self) -> Role {
        Role::Risk
    }

    fn subscriptions(&self) -> Vec<String> {
        vec!["proposal.strategy".to_string(), "proposal.amend".to_string()]
    }

    async fn handle(&self, msg: &Message, bus: &AgentNetwork) -> Result<(), AppError> {
        let Proposal::ProposalStrategy(proposal) = &msg.payload else {
            return Ok(());
        };

        let portfolio = self.portfolio.lock().clone();
        let market_stats = self.market_stats.lock().clone();
        let seed = self.next_seed.fetch_add(1, Ordering::Relaxed);

        let verdict = risk::evaluate(
            &portfolio,
            proposal,
            &market_stats,
            &self.constraints,
            seed,
            self.n_paths,
            self.confidence_alpha,
        );

        bus.publish(
            Role::Risk,
            Destination::All,
            "proposal.risk_verdict",
            Proposal::ProposalRiskVerdict(verdict),
            Some(msg.id),
        );
        Ok(())
    }
}
