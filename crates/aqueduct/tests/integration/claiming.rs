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

//! Concurrency and eligibility tests for the claiming protocol.
//!
//! These tests verify that the atomic claim prevents race conditions where
//! multiple workers might claim the same entry simultaneously, and that
//! delayed entries stay invisible until their effective time.

use chrono::{Duration as ChronoDuration, Utc};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

use aqueduct::QueueEntryState;

use crate::fixtures::{get_or_init_fixture, make_entry};

const LEASE: Duration = Duration::from_secs(300);

/// Multiple workers racing on the same store claim each entry exactly once.
#[tokio::test]
#[serial]
async fn test_concurrent_claiming_no_duplicates() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;

    let dal = guard.get_dal();
    let now = Utc::now();

    const NUM_ENTRIES: usize = 20;
    let mut created_ids = Vec::new();
    for _ in 0..NUM_ENTRIES {
        let id = dal
            .queue_entries()
            .insert(make_entry("concurrent-claim-test", now))
            .await
            .expect("Failed to insert entry");
        created_ids.push(id);
    }

    // Release the fixture lock before spawning concurrent workers
    drop(guard);

    const NUM_WORKERS: usize = 10;
    let barrier = Arc::new(Barrier::new(NUM_WORKERS));
    let mut handles = Vec::new();

    for worker_id in 0..NUM_WORKERS {
        let dal = dal.clone();
        let barrier = barrier.clone();

        handles.push(tokio::spawn(async move {
            let owner = format!("worker-{worker_id}");
            barrier.wait().await;

            let mut claimed = Vec::new();
            for _ in 0..5 {
                let entries = dal
                    .queue_entries()
                    .claim_batch("concurrent-claim-test", Utc::now(), 2, &owner, LEASE)
                    .await
                    .expect("Claim batch failed");
                for entry in entries {
                    claimed.push(entry.id);
                }
            }
            claimed
        }));
    }

    let mut all_claimed: Vec<Uuid> = Vec::new();
    for handle in handles {
        all_claimed.extend(handle.await.expect("Worker task panicked"));
    }

    let unique: HashSet<_> = all_claimed.iter().collect();
    assert_eq!(
        all_claimed.len(),
        unique.len(),
        "RACE CONDITION DETECTED: some entries were claimed by multiple workers! \
         Total claims: {}, unique entries: {}",
        all_claimed.len(),
        unique.len()
    );

    assert_eq!(
        unique.len(),
        NUM_ENTRIES,
        "All entries should be claimed exactly once"
    );

    let created: HashSet<_> = created_ids.iter().collect();
    for id in &all_claimed {
        assert!(created.contains(id), "Claimed unknown entry {id}");
    }
}

/// Claimed entries carry the claimer's owner id and a fresh lease.
#[tokio::test]
#[serial]
async fn test_claimed_entries_marked_in_processing() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let dal = guard.get_dal();
    drop(guard);

    let now = Utc::now();
    let id = dal
        .queue_entries()
        .insert(make_entry("claim-status-test", now))
        .await
        .expect("Failed to insert entry");

    let claimed = dal
        .queue_entries()
        .claim_batch("claim-status-test", now, 10, "worker-a", LEASE)
        .await
        .expect("Claim batch failed");

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, id);

    let entry = dal.queue_entries().by_id(id).await.expect("byId failed");
    assert_eq!(entry.state, QueueEntryState::InProcessing);
    assert_eq!(entry.owner.as_deref(), Some("worker-a"));
    let lease_expires_at = entry.lease_expires_at.expect("lease should be set");
    assert_eq!(
        lease_expires_at.signed_duration_since(now).num_seconds(),
        300
    );
}

/// Delayed entries are invisible to claimers until their effective time.
#[tokio::test]
#[serial]
async fn test_delayed_entries_not_claimable_early() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let dal = guard.get_dal();
    drop(guard);

    let now = Utc::now();
    let effective_at = now + ChronoDuration::seconds(60);
    dal.queue_entries()
        .insert(make_entry("delayed-test", effective_at))
        .await
        .expect("Failed to insert entry");

    let claimed = dal
        .queue_entries()
        .claim_batch("delayed-test", now, 10, "worker-a", LEASE)
        .await
        .expect("Claim batch failed");
    assert!(claimed.is_empty(), "Entry claimed before its effective time");

    let claimed = dal
        .queue_entries()
        .claim_batch("delayed-test", effective_at, 10, "worker-a", LEASE)
        .await
        .expect("Claim batch failed");
    assert_eq!(claimed.len(), 1, "Entry should be claimable at its effective time");
}

/// The claim batch honors its limit and leaves the rest available.
#[tokio::test]
#[serial]
async fn test_claim_respects_batch_limit() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let dal = guard.get_dal();
    drop(guard);

    let now = Utc::now();
    for _ in 0..7 {
        dal.queue_entries()
            .insert(make_entry("batch-limit-test", now))
            .await
            .expect("Failed to insert entry");
    }

    let claimed = dal
        .queue_entries()
        .claim_batch("batch-limit-test", now, 3, "worker-a", LEASE)
        .await
        .expect("Claim batch failed");
    assert_eq!(claimed.len(), 3);

    let remaining = dal
        .queue_entries()
        .count_in_state("batch-limit-test", QueueEntryState::Available)
        .await
        .expect("Count failed");
    assert_eq!(remaining, 4);
}

/// Claims never cross queue boundaries.
#[tokio::test]
#[serial]
async fn test_claim_scoped_to_queue() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let dal = guard.get_dal();
    drop(guard);

    let now = Utc::now();
    dal.queue_entries()
        .insert(make_entry("queue-a", now))
        .await
        .expect("Failed to insert entry");
    dal.queue_entries()
        .insert(make_entry("queue-b", now))
        .await
        .expect("Failed to insert entry");

    let claimed = dal
        .queue_entries()
        .claim_batch("queue-a", now, 10, "worker-a", LEASE)
        .await
        .expect("Claim batch failed");

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].queue_name, "queue-a");
}

/// Operational reads: byId round-trip, search-key filtering and removal.
#[tokio::test]
#[serial]
async fn test_operational_reads_and_removal() {
    let fixture = get_or_init_fixture();
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    let dal = guard.get_dal();
    drop(guard);

    let now = Utc::now();
    let mut tenant_entry = make_entry("ops-test", now);
    tenant_entry.search_key1 = Some(101);
    tenant_entry.search_key2 = Some(7);
    let id = dal
        .queue_entries()
        .insert(tenant_entry)
        .await
        .expect("Failed to insert entry");

    let mut other = make_entry("ops-test", now);
    other.search_key1 = Some(202);
    dal.queue_entries()
        .insert(other)
        .await
        .expect("Failed to insert entry");

    let found = dal
        .queue_entries()
        .search(Some(101), None)
        .await
        .expect("Search failed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
    assert_eq!(found[0].search_key2, Some(7));

    // Removal follows the same owner discipline as the other transitions
    let claimed = dal
        .queue_entries()
        .claim_batch("ops-test", now, 10, "ops-worker", LEASE)
        .await
        .expect("Claim batch failed");
    assert_eq!(claimed.len(), 2);

    dal.queue_entries()
        .mark_removed(id, "ops-worker", now)
        .await
        .expect("mark_removed failed");

    let entry = dal.queue_entries().by_id(id).await.expect("byId failed");
    assert_eq!(entry.state, QueueEntryState::Removed);
    assert!(entry.owner.is_none());
}
