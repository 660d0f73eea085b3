// Unit tests for the request coordinator
// The scripted transport lives in the integration tests; here events are
// injected directly through on_event

use crate::coordinator::{RequestCoordinator, no_result_sentinel, timeout_sentinel};
use crate::error::query::QueryError;
use crate::frame::IncomingEvent;

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

fn partial(content: serde_json::Value) -> IncomingEvent {
    IncomingEvent::Partial { content }
}

fn final_event(content: serde_json::Value, uuid: &str) -> IncomingEvent {
    IncomingEvent::Final {
        content,
        uuid: Some(uuid.to_string()),
    }
}

fn ack(payload: serde_json::Value, uuid: Option<&str>) -> IncomingEvent {
    IncomingEvent::Ack {
        payload,
        uuid: uuid.map(str::to_string),
    }
}

fn deadline_in(duration: Duration) -> Instant {
    Instant::now() + duration
}

// ============================================
// SINGLE-IN-FLIGHT DISCIPLINE
// ============================================

/// **VALUE**: Verifies the one-outstanding-query invariant.
///
/// **WHY THIS MATTERS**: The protocol correlates events with the single
/// in-flight query by position, not by id. Two concurrent queries would
/// interleave their results indistinguishably.
///
/// **BUG THIS CATCHES**: Would catch submit forgetting to check state, or
/// completion forgetting to return to idle.
#[tokio::test]
async fn given_query_in_flight_when_submitted_again_then_concurrent_request_error() {
    let coordinator = RequestCoordinator::new();

    coordinator.submit().await.expect("first submit");
    let second = coordinator.submit().await;
    assert!(matches!(second, Err(QueryError::ConcurrentRequest { .. })));

    // Completion reopens the gate.
    coordinator
        .on_event(final_event(json!({"answer": "x"}), "u-1"))
        .await;
    coordinator.submit().await.expect("submit after completion");
}

#[tokio::test]
async fn given_sequential_submits_when_advanced_then_prefixes_are_distinct() {
    let coordinator = RequestCoordinator::new();

    let first = coordinator.submit().await.unwrap();
    coordinator.force_idle().await;
    let second = coordinator.submit().await.unwrap();

    assert_ne!(first, second);
}

// ============================================
// EVENT DELIVERY
// ============================================

#[tokio::test]
async fn given_no_query_in_flight_when_event_arrives_then_dropped() {
    let coordinator = RequestCoordinator::new();

    let delivered = coordinator.on_event(partial(json!({"late": true}))).await;
    assert!(!delivered);

    // The dropped event must not surface in the next cycle.
    coordinator.submit().await.unwrap();
    coordinator
        .on_event(final_event(json!({"answer": "fresh"}), "u-1"))
        .await;
    let result = coordinator.pull_sync(deadline_in(Duration::from_secs(1))).await;
    assert_eq!(result["answer"], "fresh");
}

#[tokio::test]
async fn given_keepalive_when_delivered_then_never_queued_and_state_unchanged() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();

    assert!(!coordinator.on_event(IncomingEvent::Keepalive).await);
    assert!(coordinator.in_flight().await);

    coordinator
        .on_event(final_event(json!({"answer": "x"}), "u-1"))
        .await;
    let result = coordinator.pull_sync(deadline_in(Duration::from_secs(1))).await;
    assert_eq!(result["answer"], "x", "keepalive must not shadow the answer");
}

/// **VALUE**: Verifies duplicate-uuid suppression across query cycles.
///
/// **WHY THIS MATTERS**: The server acknowledges a completed query after the
/// fact; that ack would otherwise complete the NEXT query with the previous
/// answer.
///
/// **BUG THIS CATCHES**: Would catch forgetting to carry
/// `last_completed_uuid` across submit, or comparing against the wrong uuid.
#[tokio::test]
async fn given_stale_ack_when_next_cycle_runs_then_suppressed() {
    let coordinator = RequestCoordinator::new();

    coordinator.submit().await.unwrap();
    coordinator
        .on_event(final_event(json!({"answer": "first"}), "u-1"))
        .await;
    coordinator.pull_sync(deadline_in(Duration::from_secs(1))).await;

    // Next cycle: the stale ack for u-1 must not terminate it.
    coordinator.submit().await.unwrap();
    let delivered = coordinator.on_event(ack(json!({"uuid": "u-1"}), Some("u-1"))).await;
    assert!(!delivered);
    assert!(coordinator.in_flight().await);

    // A fresh ack is a terminal signal.
    let delivered = coordinator
        .on_event(ack(json!({"uuid": "u-2", "note": "done"}), Some("u-2")))
        .await;
    assert!(delivered);
    assert!(!coordinator.in_flight().await);
}

#[tokio::test]
async fn given_ack_without_uuid_when_delivered_then_terminal() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();

    coordinator.on_event(ack(json!({"note": "done"}), None)).await;

    assert!(!coordinator.in_flight().await);
    let result = coordinator.pull_sync(deadline_in(Duration::from_secs(1))).await;
    assert_eq!(result["note"], "done");
}

// ============================================
// SYNCHRONOUS PULL
// ============================================

#[tokio::test]
async fn given_completed_cycle_when_pulled_sync_then_most_recent_item_returned() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();

    coordinator.on_event(partial(json!({"answer": "Paris is"}))).await;
    coordinator
        .on_event(final_event(json!({"answer": "Paris is the capital of France."}), "u-1"))
        .await;

    let result = coordinator.pull_sync(deadline_in(Duration::from_secs(1))).await;
    assert_eq!(result["answer"], "Paris is the capital of France.");
}

#[tokio::test]
async fn given_completed_cycle_without_items_when_pulled_sync_then_no_result_sentinel() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();
    coordinator.force_idle().await;

    let result = coordinator.pull_sync(deadline_in(Duration::from_secs(1))).await;
    assert_eq!(result, no_result_sentinel());
}

/// **VALUE**: Verifies timeout expiry returns the sentinel and reopens the
/// coordinator.
///
/// **WHY THIS MATTERS**: A timed-out query must not wedge the session: the
/// caller gets a sentinel value (not an error) and the very next submit has
/// to succeed.
///
/// **BUG THIS CATCHES**: Would catch leaving the cycle in flight after
/// expiry, or surfacing the timeout as a hard error.
#[tokio::test]
async fn given_no_completion_when_deadline_passes_then_timeout_sentinel_and_idle() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();

    let result = coordinator
        .pull_sync(deadline_in(Duration::from_millis(20)))
        .await;

    assert_eq!(result, timeout_sentinel());
    assert!(!coordinator.in_flight().await);
    coordinator.submit().await.expect("submit right after timeout");
}

#[tokio::test]
async fn given_late_event_after_timeout_when_delivered_then_hard_dropped() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();
    coordinator
        .pull_sync(deadline_in(Duration::from_millis(10)))
        .await;

    // The abandoned query's frame arrives late: it must not leak anywhere.
    assert!(!coordinator.on_event(partial(json!({"stale": true}))).await);

    coordinator.submit().await.unwrap();
    coordinator
        .on_event(final_event(json!({"answer": "next"}), "u-9"))
        .await;
    let result = coordinator.pull_sync(deadline_in(Duration::from_secs(1))).await;
    assert_eq!(result["answer"], "next");
}

// ============================================
// STREAMING PULL
// ============================================

#[tokio::test]
async fn given_queued_items_when_streamed_then_yielded_oldest_first_then_ends() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();

    coordinator.on_event(partial(json!({"chunk": 1}))).await;
    coordinator.on_event(partial(json!({"chunk": 2}))).await;
    coordinator
        .on_event(final_event(json!({"chunk": 3}), "u-1"))
        .await;

    let items = coordinator
        .pull_streaming(deadline_in(Duration::from_secs(1)))
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["chunk"], 1);
    assert_eq!(items[1]["chunk"], 2);
    assert_eq!(items[2]["chunk"], 3);
}

#[tokio::test]
async fn given_no_completion_when_streamed_past_deadline_then_single_timeout_sentinel() {
    let coordinator = RequestCoordinator::new();
    coordinator.submit().await.unwrap();
    coordinator.on_event(partial(json!({"chunk": 1}))).await;

    let mut stream = coordinator.pull_streaming(deadline_in(Duration::from_millis(20)));

    assert_eq!(stream.next().await.unwrap()["chunk"], 1);
    assert_eq!(stream.next().await, Some(timeout_sentinel()));
    assert_eq!(stream.next().await, None, "stream is finite after timeout");
    assert!(!coordinator.in_flight().await);
}
