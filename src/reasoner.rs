//! Reasoner Port: the pluggable interface turning `(role, prompt, context)`
//! into a structured proposal. The core never imports an LLM SDK directly;
//! it depends only on this trait, with a deterministic stub used by the
//! test harness and by `StubReasoner`-backed sessions.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::message::Role;

pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const RETRY_BACKOFF_FACTOR: u32 = 2;
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Computes the exponential backoff delay for the Nth retry attempt
/// (1-indexed), capped at `RETRY_MAX_DELAY`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let millis = RETRY_BASE_DELAY.as_millis() as u64 * RETRY_BACKOFF_FACTOR.pow(attempt.saturating_sub(1)) as u64;
    Duration::from_millis(millis).min(RETRY_MAX_DELAY)
}

#[derive(Debug, Clone)]
pub struct ReasonContext {
    pub session_id: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct StructuredResult {
    pub value: Value,
}

/// The port every agent calls through. Implementations must be cancellable
/// (the future itself is the cancellation point: dropping it cancels the
/// in-flight call).
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason_once(
        &self,
        role: Role,
        prompt_template_id: &str,
        context: &ReasonContext,
    ) -> Result<StructuredResult, AppError>;

    /// Calls `reason_once` applying the retry policy from the Reasoner
    /// Port contract: `Timeout`/`RateLimited` retried with exponential
    /// backoff up to `MAX_RETRY_ATTEMPTS`; `SchemaViolation` retried once
    /// with a repair suffix appended to the prompt id; `Upstream` surfaced
    /// immediately.
    async fn reason(
        &self,
        role: Role,
        prompt_template_id: &str,
        context: &ReasonContext,
    ) -> Result<StructuredResult, AppError> {
        let mut attempt = 0u32;
        let mut repaired = false;
        loop {
            attempt += 1;
            match self.reason_once(role, prompt_template_id, context).await {
                Ok(result) => return Ok(result),
                Err(AppError::ReasonerTimeout { .. }) | Err(AppError::ReasonerRateLimited { .. })
                    if attempt < MAX_RETRY_ATTEMPTS =>
                {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
                Err(AppError::SchemaViolation { .. }) if !repaired => {
                    repaired = true;
                    let repair_prompt = format!("{prompt_template_id}:repair");
                    return self.reason_once(role, &repair_prompt, context).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Caps how many `reason_once` calls against the wrapped backend may be
/// in flight at once, so a session fan-out of Strategy agents never opens
/// more concurrent reasoner calls than `reasoner.concurrency` allows.
/// Wraps `reason_once` rather than `reason` so the gate applies per
/// underlying attempt, retries included.
pub struct ConcurrencyLimitedReasoner {
    inner: Arc<dyn Reasoner>,
    permits: Arc<Semaphore>,
}

impl ConcurrencyLimitedReasoner {
    pub fn new(inner: Arc<dyn Reasoner>, concurrency: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }
}

#[async_trait]
impl Reasoner for ConcurrencyLimitedReasoner {
    async fn reason_once(
        &self,
        role: Role,
        prompt_template_id: &str,
        context: &ReasonContext,
    ) -> Result<StructuredResult, AppError> {
        let _permit = self.permits.acquire().await.expect("semaphore never closes");
        self.inner.reason_once(role, prompt_template_id, context).await
    }
}

/// Deterministic stub reasoner used by the test harness. Responses are
/// keyed by `(role, hash(context))`; registering a canned response makes
/// `reason` reproducible across runs.
#[derive(Default)]
pub struct StubReasoner {
    canned: Mutex<HashMap<(Role, u64), StructuredResult>>,
    fallback: Mutex<Option<StructuredResult>>,
}

impl StubReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    fn context_hash(context: &ReasonContext) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        context.data.to_string().hash(&mut hasher);
        hasher.finish()
    }

    /// Register the response a given role should produce for a given
    /// context, so `(role, hash(context))` deterministically maps to it.
    pub fn stub(&self, role: Role, context: &ReasonContext, value: Value) {
        let key = (role, Self::context_hash(context));
        self.canned.lock().insert(key, StructuredResult { value });
    }

    /// Register a response returned regardless of context, used when a
    /// test does not care about keying.
    pub fn stub_any(&self, value: Value) {
        *self.fallback.lock() = Some(StructuredResult { value });
    }
}

#[async_trait]
impl Reasoner for StubReasoner {
    async fn reason_once(
        &self,
        role: Role,
        _prompt_template_id: &str,
        context: &ReasonContext,
    ) -> Result<StructuredResult, AppError> {
        let key = (role, Self::context_hash(context));
        if let Some(result) = self.canned.lock().get(&key).cloned() {
            return Ok(result);
        }
        if let Some(result) = self.fallback.lock().clone() {
            return Ok(result);
        }
        Err(AppError::Upstream(format!(
            "no stubbed response for role {role} and this context"
        )))
    }
}
