//! The immutable message envelope that flows over the agent network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proposal::Proposal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Market,
    Strategy,
    Risk,
    Executor,
    Explainer,
    User,
    Orchestrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Market => "market",
            Role::Strategy => "strategy",
            Role::Risk => "risk",
            Role::Executor => "executor",
            Role::Explainer => "explainer",
            Role::User => "user",
            Role::Orchestrator => "orchestrator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Addressing for a message: a specific role or a broadcast to all subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Role(Role),
    All,
}

impl Destination {
    pub fn matches(&self, role: Role) -> bool {
        match self {
            Destination::Role(r) => *r == role,
            Destination::All => true,
        }
    }
}

/// Immutable envelope on the bus. Once published, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub session_id: String,
    pub from: Role,
    pub to: Destination,
    pub topic: String,
    pub causation_id: Option<u64>,
    pub ts: DateTime<Utc>,
    pub payload: Proposal,
}

impl Message {
    /// Topic hierarchy match: `a.b.*` matches `a.b.c`, `a.*` matches `a.b.c`,
    /// and an exact topic matches only itself. `*` alone matches everything.
    pub fn topic_matches(&self, pattern: &str) -> bool {
        topic_matches(&self.topic, pattern)
    }
}

pub fn topic_matches(topic: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return topic == prefix || topic.starts_with(&format!("{prefix}."));
    }
    topic == pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        assert!(topic_matches("market.snapshot", "*"));
        assert!(topic_matches("debate.round.1.result", "*"));
    }

    #[test]
    fn hierarchical_wildcard_matches_prefix() {
        assert!(topic_matches("debate.round.1.result", "debate.round.*"));
        assert!(topic_matches("debate.round", "debate.round.*"));
        assert!(!topic_matches("debate.other", "debate.round.*"));
    }

    #[test]
    fn exact_topic_matches_only_itself() {
        assert!(topic_matches("market.snapshot", "market.snapshot"));
        assert!(!topic_matches("market.snapshot.v2", "market.snapshot"));
    }

    #[test]
    fn destination_matching() {
        assert!(Destination::All.matches(Role::Risk));
        assert!(Destination::Role(Role::Risk).matches(Role::Risk));
        assert!(!Destination::Role(Role::Risk).matches(Role::Strategy));
    }
}
