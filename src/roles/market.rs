//! Market role: aggregates replay bars into throttled `market.snapshot`
//! broadcasts (minimum 1Hz publication interval per the role-wiring table).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agent::AgentHandler;
use crate::bus::AgentNetwork;
use crate::error::AppError;
use crate::message::{Destination, Message, Role};
use crate::portfolio::MarketRegime;
use crate::proposal::{MarketSnapshot, Proposal};

fn infer_regime(quotes: &BTreeMap<String, f64>, previous: &BTreeMap<String, f64>) -> MarketRegime {
    if quotes.is_empty() || previous.is_empty() {
        return MarketRegime::Normal;
    }
    let mut worst = 0.0f64;
    for (symbol, price) in quotes {
        if let Some(prev_price) = previous.get(symbol) {
            if *prev_price > 0.0 {
                let change = (price - prev_price) / prev_price;
                worst = worst.min(change);
            }
        }
    }
    match worst {
        c if c <= -0.15 => MarketRegime::Crisis,
        c if c <= -0.05 => MarketRegime::Bearish,
        c if c >= 0.05 => MarketRegime::Bullish,
        c if c <= -0.02 => MarketRegime::Volatile,
        _ => MarketRegime::Normal,
    }
}

pub struct MarketAgent {
    min_interval: Duration,
    state: Mutex<MarketState>,
}

struct MarketState {
    quotes: BTreeMap<String, f64>,
    previous_quotes: BTreeMap<String, f64>,
    last_published: Option<Instant>,
}

impl MarketAgent {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(MarketState {
                quotes: BTreeMap::new(),
                previous_quotes: BTreeMap::new(),
                last_published: None,
            }),
        }
    }
}

impl Default for MarketAgent {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl AgentHandler for MarketAgent {
    fn role(&self) -> Role {
        Role::Market
    }

    fn subscriptions(&self) -> Vec<String> {
        vec!["replay.bar".to_string()]
    }

    async fn handle(&self, msg: &Message, bus: &AgentNetwork) -> Result<(), AppError> {
        let Proposal::ReplayBar(bar) = &msg.payload else {
            return Ok(());
        };

        let mut state = self.state.lock();
        state.quotes.insert(bar.symbol.clone(), bar.c);

        let now = Instant::now();
        let should_publish = state
            .last_published
            .map_or(true, |last| now.duration_since(last) >= self.min_interval);
        if !should_publish {
            return Ok(());
        }

        let quotes = state.quotes.clone();
        let regime = infer_regime(&quotes, &state.previous_quotes);
        state.previous_quotes = quotes.clone();
        state.last_published = Some(now);
        drop(state);

        bus.publish(
            Role::Market,
            Destination::All,
            "market.snapshot",
            Proposal::MarketSnapshot(MarketSnapshot {
                quotes,
                regime: format!("{regime:?}").to_lowercase(),
            }),
            Some(msg.id),
        );
        Ok(())
    }
}
