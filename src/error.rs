//! Error taxonomy for the orchestrator core.
//!
//! Mirrors the four error kinds of the debate/error design: `Transient`
//! errors are retried locally, `Protocol` errors fail the current round,
//! `Policy` errors are surfaced to the user without terminating the
//! session, and `Fatal` errors terminate the session.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Protocol,
    Policy,
    Fatal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("reasoner timeout after {attempts} attempt(s)")]
    ReasonerTimeout { attempts: u32 },

    #[error("reasoner rate limited after {attempts} attempt(s)")]
    ReasonerRateLimited { attempts: u32 },

    #[error("reasoner output violated schema for role {role}: {detail}")]
    SchemaViolation { role: String, detail: String },

    #[error("reasoner upstream failure: {0}")]
    Upstream(String),

    #[error("malformed proposal: {0}")]
    MalformedProposal(String),

    #[error("missing causation_id on message {0}")]
    MissingCausationId(u64),

    #[error("risk verdict rejected: {0}")]
    RiskRejected(String),

    #[error("user rejected proposal")]
    UserRejected,

    #[error("constraint violated: {0:?}")]
    ConstraintViolation(Vec<String>),

    #[error("agent {role} crashed {count} time(s), exceeding retry budget")]
    RepeatedAgentFailure { role: String, count: u32 },

    #[error("debate engine failed: {0}")]
    DebateEngineFailure(String),

    #[error("bus failure: {0}")]
    BusFailure(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ReasonerTimeout { .. } | AppError::ReasonerRateLimited { .. } => {
                ErrorKind::Transient
            }
            AppError::SchemaViolation { .. }
            | AppError::MalformedProposal(_)
            | AppError::MissingCausationId(_) => ErrorKind::Protocol,
            AppError::RiskRejected(_) | AppError::UserRejected | AppError::ConstraintViolation(_) => {
                ErrorKind::Policy
            }
            AppError::RepeatedAgentFailure { .. }
            | AppError::DebateEngineFailure(_)
            | AppError::BusFailure(_) => ErrorKind::Fatal,
            AppError::Upstream(_) => ErrorKind::Fatal,
            AppError::SessionNotFound(_) | AppError::Io(_) | AppError::Serde(_) | AppError::Toml(_) => {
                ErrorKind::Fatal
            }
        }
    }
}
