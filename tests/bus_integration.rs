//! Integration coverage for the Agent Network's pub/sub contract:
//! hierarchical topic matching and backpressure eviction, exercised
//! through the public crate API rather than `bus`'s own unit tests.

use std::collections::BTreeMap;

use apex_core::bus::AgentNetwork;
use apex_core::message::{Destination, Role};
use apex_core::proposal::{MarketSnapshot, Proposal};

fn snapshot() -> Proposal {
    Proposal::MarketSnapshot(MarketSnapshot {
        quotes: BTreeMap::new(),
        regime: "normal".to_string(),
    })
}

#[tokio::test]
async fn multiple_subscribers_all_receive_a_broadcast() {
    let bus = AgentNetwork::new("s1");
    let mut strategy_sub = bus.subscribe(Role::Strategy, "market.*");
    let mut risk_sub = bus.subscribe(Role::Risk, "*");

    bus.publish(Role::Market, Destination::All, "market.snapshot", snapshot(), None);

    assert!(strategy_sub.rx.recv().await.is_some());
    assert!(risk_sub.rx.recv().await.is_some());
}

#[tokio::test]
async fn unsubscribed_role_never_receives_directed_message() {
    let bus = AgentNetwork::new("s1");
    let mut executor_sub = bus.subscribe(Role::Executor, "*");

    bus.publish(
        Role::Market,
        Destination::Role(Role::Strategy),
        "market.snapshot",
        snapshot(),
        None,
    );

    assert!(executor_sub.rx.try_recv().is_err());
}

#[tokio::test]
async fn slow_subscriber_is_evicted_without_blocking_others() {
    let bus = AgentNetwork::with_backpressure("s1", 1);
    let _slow = bus.subscribe(Role::Strategy, "*");
    let mut fast = bus.subscribe(Role::Risk, "*");

    // The slow subscriber's one-slot queue fills on the first publish and
    // overflows on the second; the fast subscriber keeps receiving both.
    bus.publish(Role::Market, Destination::All, "market.snapshot", snapshot(), None);
    bus.publish(Role::Market, Destination::All, "market.snapshot", snapshot(), None);

    assert!(fast.rx.recv().await.is_some());
    assert!(fast.rx.recv().await.is_some());

    let events = bus.slow_subscriber_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].role, Role::Strategy);
}

#[tokio::test]
async fn history_preserves_total_publication_order() {
    let bus = AgentNetwork::new("s1");
    for _ in 0..5 {
        bus.publish(Role::Market, Destination::All, "market.snapshot", snapshot(), None);
    }
    let history = bus.history(None);
    let ids: Vec<u64> = history.iter().map(|m| m.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}
