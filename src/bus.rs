//! Agent Network: topic-addressed pub/sub with at-least-once delivery
//! within a session, a bounded per-subscriber queue, and an append-only
//! message history in publication order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

use crate::message::{topic_matches, Destination, Message, Role};
use crate::proposal::Proposal;

pub const DEFAULT_BACKPRESSURE_THRESHOLD: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Emitted when a subscriber falls behind by more than the backpressure
/// threshold and is dropped so other subscribers never silently lose
/// messages on its account.
#[derive(Debug, Clone)]
pub struct SlowSubscriberEvent {
    pub session_id: String,
    pub subscription: SubscriptionId,
    pub role: Role,
    pub pattern: String,
}

struct Subscriber {
    id: SubscriptionId,
    role: Role,
    pattern: String,
    tx: mpsc::Sender<Message>,
}

/// A handle returned by `subscribe`: drop it (or call `unsubscribe`) to
/// stop receiving further messages.
pub struct Subscription {
    pub id: SubscriptionId,
    pub rx: mpsc::Receiver<Message>,
}

pub struct AgentNetwork {
    session_id: String,
    next_msg_id: AtomicU64,
    next_sub_id: AtomicU64,
    history: RwLock<Vec<Message>>,
    subscribers: RwLock<Vec<Subscriber>>,
    backpressure_threshold: usize,
    slow_subscriber_events: RwLock<Vec<SlowSubscriberEvent>>,
}

impl AgentNetwork {
    pub fn new(session_id: impl Into<String>) -> Arc<Self> {
        Self::with_backpressure(session_id, DEFAULT_BACKPRESSURE_THRESHOLD)
    }

    pub fn with_backpressure(session_id: impl Into<String>, backpressure_threshold: usize) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.into(),
            next_msg_id: AtomicU64::new(1),
            next_sub_id: AtomicU64::new(1),
            history: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            backpressure_threshold,
            slow_subscriber_events: RwLock::new(Vec::new()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Subscribe to a hierarchical topic pattern (`a.b.*`, `*`, or an exact
    /// topic) as the given role. Messages addressed to `Destination::All`
    /// or specifically to `role` and matching the pattern are delivered.
    pub fn subscribe(&self, role: Role, topic_pattern: impl Into<String>) -> Subscription {
        let id = SubscriptionId(self.next_sub_id.fetch_add(1, Ordering::Relaxed));
        let pattern = topic_pattern.into();
        let (tx, rx) = mpsc::channel(self.backpressure_threshold);
        self.subscribers.write().push(Subscriber {
            id,
            role,
            pattern,
            tx,
        });
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    /// Publish a message. Assigns a monotonic id and timestamp, appends it
    /// to history (single-writer, append-only), then fans it out to
    /// matching subscribers. A subscriber whose queue is full is dropped
    /// and a `SlowSubscriberEvent` is recorded rather than blocking or
    /// silently discarding the message for other subscribers.
    pub fn publish(
        &self,
        from: Role,
        to: Destination,
        topic: impl Into<String>,
        payload: Proposal,
        causation_id: Option<u64>,
    ) -> Message {
        let id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        let msg = Message {
            id,
            session_id: self.session_id.clone(),
            from,
            to,
            topic: topic.into(),
            causation_id,
            ts: chrono::Utc::now(),
            payload,
        };

        self.history.write().push(msg.clone());

        let mut dropped = Vec::new();
        {
            let subs = self.subscribers.read();
            for sub in subs.iter() {
                if !msg.to.matches(sub.role) {
                    continue;
                }
                if !msg.topic_matches(&sub.pattern) {
                    continue;
                }
                if let Err(mpsc::error::TrySendError::Full(_)) = sub.tx.try_send(msg.clone()) {
                    warn!(
                        session_id = %self.session_id,
                        subscription = sub.id.0,
                        role = %sub.role,
                        "slow subscriber exceeded backpressure threshold, dropping"
                    );
                    dropped.push(SlowSubscriberEvent {
                        session_id: self.session_id.clone(),
                        subscription: sub.id,
                        role: sub.role,
                        pattern: sub.pattern.clone(),
                    });
                }
                // A closed channel (subscriber already gone) is not an
                // error: the subscriber simply stopped polling.
            }
        }

        if !dropped.is_empty() {
            let dropped_ids: Vec<_> = dropped.iter().map(|e| e.subscription).collect();
            self.subscribers.write().retain(|s| !dropped_ids.contains(&s.id));
            self.slow_subscriber_events.write().extend(dropped);
        }

        msg
    }

    /// Total-order history, optionally since (exclusive) a given message id.
    pub fn history(&self, since_msg_id: Option<u64>) -> Vec<Message> {
        let history = self.history.read();
        match since_msg_id {
            Some(since) => history.iter().filter(|m| m.id > since).cloned().collect(),
            None => history.clone(),
        }
    }

    pub fn slow_subscriber_events(&self) -> Vec<SlowSubscriberEvent> {
        self.slow_subscriber_events.read().clone()
    }
}
