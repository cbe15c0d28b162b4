//! Per-role `AgentHandler` implementations wired by the orchestrator: the
//! role-specific logic the generic Agent Runtime loop drives.

mod executor;
mod explainer;
mod market;
mod risk_agent;
mod strategy;
mod user;

pub use executor::ExecutorAgent;
pub use explainer::ExplainerAgent;
pub use market::MarketAgent;
pub use risk_agent::RiskAgent;
pub use strategy::StrategyAgent;
pub use user::UserAgent;
