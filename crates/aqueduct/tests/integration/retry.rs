/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Retry scheduling against the real store, driven by a test clock.
//!
//! Each attempt is a new row: the originals end `RETRIED`, the last one
//! `PROCESSED` or `FAILED`, and the audit trail shows one entry per
//! attempt with effective times spaced by the backoff policy.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serial_test::serial;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aqueduct::dispatcher::{Dispatcher, RegisteredQueue};
use aqueduct::{
    AtomicMetricsSink, BackoffPolicy, Clock, EventEnvelope, HandlerError, QueueEntryState,
    QueueHandler, RetryPolicy, TestClock,
};

use crate::fixtures::{get_or_init_fixture, make_entry};

const LEASE: Duration = Duration::from_secs(300);

/// Fails the first `failures` invocations, then succeeds.
struct FlakyHandler {
    failures: i32,
    invocations: AtomicI32,
}

impl FlakyHandler {
    fn new(failures: i32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            invocations: AtomicI32::new(0),
        })
    }
}

#[async_trait]
impl QueueHandler for FlakyHandler {
    async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst);
        if invocation < self.failures {
            Err(HandlerError::new("payment gateway unavailable"))
        } else {
            Ok(())
        }
    }
}

/// Claims everything currently eligible and dispatches it.
async fn drain_once(
    dal: &Arc<aqueduct::DAL>,
    dispatcher: &Dispatcher,
    queue: &RegisteredQueue,
    clock: &TestClock,
) -> usize {
    let now = clock.now();
    let claimed = dal
        .queue_entries()
        .claim_batch(&queue.name, now, 10, "retry-worker", LEASE)
        .await
        .expect("Claim batch failed");
    for entry in &claimed {
        dispatcher.dispatch_entry(queue, entry, "retry-worker").await;
    }
    claimed.len()
}

/// The documented scenario: fixed 10s backoff, max 3 attempts, handler
/// fails attempts 0 and 1 and succeeds on attempt 2.
#[tokio::test]
#[serial]
async fn test_flaky_handler_succeeds_on_third_attempt() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let dal = Arc::new(guard.get_dal());
    drop(guard);

    let t0 = Utc.with_ymd_and_hms(2026, 2, 11, 12, 0, 0).unwrap();
    let clock = Arc::new(TestClock::new(t0));
    let metrics = Arc::new(AtomicMetricsSink::new());
    let dispatcher = Dispatcher::new(dal.clone(), clock.clone(), metrics.clone());

    let handler = FlakyHandler::new(2);
    let queue = RegisteredQueue {
        name: "order-paid".to_string(),
        handler: handler.clone(),
        retry_policy: RetryPolicy::new(3, BackoffPolicy::Fixed(Duration::from_secs(10))),
    };

    let mut entry = make_entry("order-paid", t0);
    entry.event_type = "OrderPaid".to_string();
    entry.search_key1 = Some(55);
    dal.queue_entries()
        .insert(entry)
        .await
        .expect("Failed to insert entry");

    // Attempt 0 fails and is rescheduled 10s out
    assert_eq!(drain_once(&dal, &dispatcher, &queue, &clock).await, 1);
    // Nothing is eligible before the backoff elapses
    assert_eq!(drain_once(&dal, &dispatcher, &queue, &clock).await, 0);

    clock.advance(Duration::from_secs(10));
    assert_eq!(drain_once(&dal, &dispatcher, &queue, &clock).await, 1);

    clock.advance(Duration::from_secs(10));
    assert_eq!(drain_once(&dal, &dispatcher, &queue, &clock).await, 1);

    assert_eq!(handler.invocations.load(Ordering::SeqCst), 3);

    // One row per attempt, metadata carried forward, effective times
    // spaced by the fixed backoff
    let mut entries = dal
        .queue_entries()
        .search(Some(55), None)
        .await
        .expect("Search failed");
    entries.sort_by_key(|e| e.attempt);

    assert_eq!(entries.len(), 3);
    for (expected_attempt, entry) in entries.iter().enumerate() {
        assert_eq!(entry.attempt, expected_attempt as i32);
        assert_eq!(entry.event_type, "OrderPaid");
        assert_eq!(entry.queue_name, "order-paid");
    }
    assert_eq!(entries[0].state, QueueEntryState::Retried);
    assert_eq!(entries[1].state, QueueEntryState::Retried);
    assert_eq!(entries[2].state, QueueEntryState::Processed);

    for pair in entries.windows(2) {
        let spacing = pair[1].effective_at - pair[0].effective_at;
        assert!(
            spacing >= chrono::Duration::seconds(10),
            "Attempts spaced {spacing} apart, expected at least 10s"
        );
    }

    assert_eq!(metrics.retried(), 2);
    assert_eq!(metrics.processed(), 1);
    assert_eq!(metrics.failed(), 0);
}

/// Once the attempt counter reaches the budget the entry is dead-lettered:
/// no replacement row, terminal `FAILED`, error surfaced for operators.
#[tokio::test]
#[serial]
async fn test_dead_letter_after_exhausted_attempts() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let dal = Arc::new(guard.get_dal());
    drop(guard);

    let t0 = Utc.with_ymd_and_hms(2026, 2, 11, 12, 0, 0).unwrap();
    let clock = Arc::new(TestClock::new(t0));
    let metrics = Arc::new(AtomicMetricsSink::new());
    let dispatcher = Dispatcher::new(dal.clone(), clock.clone(), metrics.clone());

    // Never succeeds
    let queue = RegisteredQueue {
        name: "doomed".to_string(),
        handler: FlakyHandler::new(i32::MAX),
        retry_policy: RetryPolicy::new(2, BackoffPolicy::Fixed(Duration::from_secs(5))),
    };

    let mut entry = make_entry("doomed", t0);
    entry.search_key1 = Some(66);
    dal.queue_entries()
        .insert(entry)
        .await
        .expect("Failed to insert entry");

    // Attempts 0 and 1 reschedule; attempt 2 hits the budget
    for _ in 0..3 {
        assert_eq!(drain_once(&dal, &dispatcher, &queue, &clock).await, 1);
        clock.advance(Duration::from_secs(5));
    }

    // Every entry reached a terminal state: nothing claimable forever after
    assert_eq!(drain_once(&dal, &dispatcher, &queue, &clock).await, 0);

    let mut entries = dal
        .queue_entries()
        .search(Some(66), None)
        .await
        .expect("Search failed");
    entries.sort_by_key(|e| e.attempt);

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].state, QueueEntryState::Retried);
    assert_eq!(entries[1].state, QueueEntryState::Retried);
    assert_eq!(entries[2].state, QueueEntryState::Failed);
    assert_eq!(
        entries[2].last_error.as_deref(),
        Some("payment gateway unavailable")
    );

    assert_eq!(metrics.retried(), 2);
    assert_eq!(metrics.failed(), 1);
    assert_eq!(metrics.processed(), 0);
}
