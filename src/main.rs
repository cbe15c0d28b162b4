//! `apex`: runs a research session against either the built-in reasoner
//! stub or a historical crash scenario, printing narration to stdout.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use apex_core::broker::MockBroker;
use apex_core::config::AppConfig;
use apex_core::message::{Destination, Role};
use apex_core::orchestrator::{Orchestrator, SessionStatus};
use apex_core::portfolio::{MarketStats, Portfolio};
use apex_core::proposal::{MarketSnapshot, Proposal};
use apex_core::reasoner::{Reasoner, StubReasoner};
use apex_core::replay::{BuiltinScenarios, ReplayDriver, ScenarioStore};

#[derive(Parser)]
#[command(name = "apex", about = "Multi-agent portfolio research orchestrator")]
struct Cli {
    /// Path to an apex.toml config file. Falls back to APEX_CONFIG_PATH,
    /// then to built-in defaults.
    #[arg(long, env = "APEX_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a single session seeded with a synthetic market snapshot.
    Run {
        #[arg(long, default_value = "demo")]
        session_id: String,
        #[arg(long, default_value_t = 100_000.0)]
        cash: f64,
    },
    /// Replays a built-in crash scenario, feeding its bars into a session.
    Replay {
        #[arg(long, default_value = "2008_crisis")]
        scenario: String,
        #[arg(long, default_value = "demo-replay")]
        session_id: String,
    },
    /// Lists the built-in replay scenarios.
    ListScenarios,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&str>) -> AppConfig {
    match path {
        Some(path) => AppConfig::load(path).unwrap_or_else(|e| {
            tracing::warn!(path, error = %e, "failed to load config, using defaults");
            AppConfig::default()
        }),
        None => AppConfig::from_env(),
    }
}

fn demo_market_stats() -> MarketStats {
    MarketStats {
        symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
        mean_returns: vec![0.0004, 0.0003],
        cov_matrix: vec![0.0004, 0.0001, 0.0001, 0.0003],
        horizon_days: 10,
    }
}

fn demo_reasoner() -> Arc<dyn Reasoner> {
    let stub = Arc::new(StubReasoner::new());
    stub.stub_any(serde_json::json!({
        "allocations": {"AAPL": 0.2, "MSFT": 0.2, "cash": 0.6},
        "rationale": "balanced entry under the stub reasoner backend",
        "confidence": 0.8,
    }));
    stub
}

async fn run_session(session_id: String, cash: f64, config: &AppConfig) -> Result<()> {
    let orchestrator = Orchestrator::new();
    let session = orchestrator.start_session(
        session_id,
        config,
        demo_reasoner(),
        Arc::new(MockBroker::new()),
        Portfolio::new(cash),
        demo_market_stats(),
    );

    session.bus().publish(
        Role::Market,
        Destination::All,
        "market.snapshot",
        Proposal::MarketSnapshot(MarketSnapshot {
            quotes: BTreeMap::from([("AAPL".to_string(), 180.0), ("MSFT".to_string(), 410.0)]),
            regime: "normal".to_string(),
        }),
        None,
    );

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if !matches!(session.status(), SessionStatus::Running) {
            break;
        }
    }

    println!("session status: {:?}", session.status());
    for msg in session.history(None) {
        if let Proposal::Narration(n) = &msg.payload {
            println!("[{}] {}", msg.from, n.text);
        }
    }

    session.stop();
    Ok(())
}

async fn run_replay(scenario: String, session_id: String, config: &AppConfig) -> Result<()> {
    let store = BuiltinScenarios;
    let mut driver = ReplayDriver::new();
    driver
        .load(&store, &scenario, config.replay.default_speed)
        .with_context(|| format!("unknown scenario {scenario}"))?;
    driver.start();

    let orchestrator = Orchestrator::new();
    let session = orchestrator.start_session(
        session_id,
        config,
        demo_reasoner(),
        Arc::new(MockBroker::new()),
        Portfolio::new(250_000.0),
        demo_market_stats(),
    );

    while let Some(bar) = driver.step() {
        session.bus().publish(
            Role::Orchestrator,
            Destination::All,
            "replay.bar",
            Proposal::ReplayBar(bar.into_replay_bar(&scenario)),
            None,
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if !matches!(session.status(), SessionStatus::Running) {
            break;
        }
    }

    println!("replay {scenario} finished: {:?}", session.status());
    session.stop();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Command::Run { session_id, cash } => run_session(session_id, cash, &config).await,
        Command::Replay { scenario, session_id } => run_replay(scenario, session_id, &config).await,
        Command::ListScenarios => {
            let store = BuiltinScenarios;
            for id in store.scenario_ids() {
                println!("{id}");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["apex", "run", "--session-id", "x", "--cash", "5000"]);
        match cli.command {
            Command::Run { session_id, cash } => {
                assert_eq!(session_id, "x");
                assert_eq!(cash, 5000.0);
            }
            _ => panic!("expected run subcommand"),
        }
    }
}
