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

//! End-to-end tests through the service facade with live pollers.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aqueduct::registry::SubscriberAction;
use aqueduct::{
    ConfigError, EventEnvelope, HandlerError, QueueEntryState, QueueEvent, QueueHandler,
    QueueService, QueueServiceConfig, BUS_QUEUE,
};

use crate::fixtures::get_or_init_fixture;

#[derive(Debug, Serialize, Deserialize)]
struct OrderPaid {
    order_id: u64,
    account_id: i64,
}

impl QueueEvent for OrderPaid {
    fn event_type(&self) -> &'static str {
        "OrderPaid"
    }

    fn search_key1(&self) -> Option<i64> {
        Some(self.account_id)
    }
}

struct CountingAction {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SubscriberAction for CountingAction {
    async fn run(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl QueueHandler for CountingHandler {
    async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_config() -> QueueServiceConfig {
    QueueServiceConfig::builder()
        .poll_interval(Duration::from_millis(50))
        .batch_size(10)
        .lease_duration(Duration::from_secs(60))
        .build()
}

async fn wait_for_terminal(
    dal: &aqueduct::DAL,
    queue_name: &str,
    state: QueueEntryState,
    expected: i64,
) {
    for _ in 0..200 {
        let count = dal
            .queue_entries()
            .count_in_state(queue_name, state)
            .await
            .expect("Count failed");
        if count >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("Timed out waiting for {expected} entries in state {state} on '{queue_name}'");
}

/// Posting a bus event delivers it through hierarchy dispatch: a subscriber
/// registered on the ancestor type receives the concrete event.
#[tokio::test]
#[serial]
async fn test_bus_publish_delivers_to_ancestor_subscriber() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let db = guard.get_database();
    let dal = guard.get_dal();
    drop(guard);

    let service = QueueService::new(db, fast_config());

    let registry = service.subscriber_registry();
    registry.describe_type("OrderPaid", &["OrderEvent"]);
    let calls = Arc::new(AtomicUsize::new(0));
    registry
        .subscribe("OrderEvent", Arc::new(CountingAction { calls: calls.clone() }))
        .expect("subscribe failed");

    service.start();

    let entry_id = service
        .post(&OrderPaid {
            order_id: 9000,
            account_id: 42,
        })
        .await
        .expect("post failed");

    wait_for_terminal(&dal, BUS_QUEUE, QueueEntryState::Processed, 1).await;
    service.shutdown().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let entry = dal
        .queue_entries()
        .by_id(entry_id)
        .await
        .expect("byId failed");
    assert_eq!(entry.state, QueueEntryState::Processed);
    assert_eq!(entry.event_type, "OrderPaid");
    assert_eq!(entry.search_key1, Some(42));
}

/// A named notification queue delivers scheduled events to its handler once
/// the effective time passes.
#[tokio::test]
#[serial]
async fn test_notification_queue_delivery() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let db = guard.get_database();
    let dal = guard.get_dal();
    drop(guard);

    let service = QueueService::new(db, fast_config());

    let calls = Arc::new(AtomicUsize::new(0));
    service
        .create_queue(
            "invoice-reminders",
            Arc::new(CountingHandler { calls: calls.clone() }),
            None,
        )
        .expect("create_queue failed");

    service.start();

    service
        .schedule_at(
            "invoice-reminders",
            &OrderPaid {
                order_id: 9001,
                account_id: 7,
            },
            Utc::now(),
        )
        .await
        .expect("schedule_at failed");

    wait_for_terminal(&dal, "invoice-reminders", QueueEntryState::Processed, 1).await;
    service.shutdown().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Configuration errors fail fast, before any polling starts.
#[tokio::test]
#[serial]
async fn test_configuration_errors_fail_fast() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let db = guard.get_database();
    drop(guard);

    let service = QueueService::new(db, fast_config());
    let calls = Arc::new(AtomicUsize::new(0));

    service
        .create_queue(
            "payments",
            Arc::new(CountingHandler { calls: calls.clone() }),
            None,
        )
        .expect("create_queue failed");

    // Same name twice
    let result = service.create_queue(
        "payments",
        Arc::new(CountingHandler { calls: calls.clone() }),
        None,
    );
    assert!(matches!(result, Err(ConfigError::DuplicateQueue(ref name)) if name == "payments"));

    // The bus name is taken by the built-in queue
    let result = service.create_queue(
        BUS_QUEUE,
        Arc::new(CountingHandler { calls: calls.clone() }),
        None,
    );
    assert!(matches!(result, Err(ConfigError::DuplicateQueue(_))));

    // Scheduling on an unregistered queue is refused
    let result = service
        .schedule_at(
            "nonexistent",
            &OrderPaid {
                order_id: 1,
                account_id: 1,
            },
            Utc::now(),
        )
        .await;
    assert!(result.is_err());

    // No new queues once the pollers run
    service.start();
    let result = service.create_queue(
        "late",
        Arc::new(CountingHandler { calls }),
        None,
    );
    assert!(matches!(result, Err(ConfigError::AlreadyRunning)));
    service.shutdown().await;
}
