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

//! Storage contract consumed by the queue core.
//!
//! The poller, dispatcher and retry scheduler only ever talk to this trait.
//! [`crate::dal::DAL`] is the shipped SQLite implementation; any storage
//! engine that can express `claim_batch` as a single atomic conditional
//! update can implement the same contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::dal::DAL;
use crate::error::QueueError;
use crate::models::queue_entry::{NewQueueEntry, QueueEntry, QueueEntryState};

/// Durable queue entry store.
///
/// Atomicity requirements: `insert` persists exactly one row;
/// `claim_batch` must guarantee that no two concurrent callers receive the
/// same row; the `mark_*` operations must transition only entries still
/// owned by `owner_id`, reporting [`QueueError::OwnershipLost`] otherwise.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Persists a new entry in `AVAILABLE` state; returns its id.
    async fn insert(&self, entry: NewQueueEntry) -> Result<Uuid, QueueError>;

    /// Claims up to `limit` eligible entries for `owner_id` with a lease of
    /// `lease_duration` from `now`.
    async fn claim_batch(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
        limit: usize,
        owner_id: &str,
        lease_duration: Duration,
    ) -> Result<Vec<QueueEntry>, QueueError>;

    /// Transitions an owned entry to `PROCESSED`.
    async fn mark_processed(
        &self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Transitions an owned entry to `FAILED` (dead-letter).
    async fn mark_failed(
        &self,
        id: Uuid,
        owner_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Transitions an owned entry to `RETRIED` once a replacement entry has
    /// been durably inserted.
    async fn mark_retried(
        &self,
        id: Uuid,
        owner_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Transitions an owned entry to `REMOVED`.
    async fn mark_removed(
        &self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Reads one entry by id.
    async fn by_id(&self, id: Uuid) -> Result<QueueEntry, QueueError>;

    /// Filtered read by search keys.
    async fn search(
        &self,
        search_key1: Option<i64>,
        search_key2: Option<i64>,
    ) -> Result<Vec<QueueEntry>, QueueError>;

    /// Counts entries of a queue in a given state.
    async fn count_in_state(
        &self,
        queue_name: &str,
        state: QueueEntryState,
    ) -> Result<i64, QueueError>;
}

#[async_trait]
impl QueueStore for DAL {
    async fn insert(&self, entry: NewQueueEntry) -> Result<Uuid, QueueError> {
        self.queue_entries().insert(entry).await
    }

    async fn claim_batch(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
        limit: usize,
        owner_id: &str,
        lease_duration: Duration,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        self.queue_entries()
            .claim_batch(queue_name, now, limit, owner_id, lease_duration)
            .await
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.queue_entries().mark_processed(id, owner_id, now).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        owner_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.queue_entries()
            .mark_failed(id, owner_id, error, now)
            .await
    }

    async fn mark_retried(
        &self,
        id: Uuid,
        owner_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.queue_entries()
            .mark_retried(id, owner_id, error, now)
            .await
    }

    async fn mark_removed(
        &self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.queue_entries().mark_removed(id, owner_id, now).await
    }

    async fn by_id(&self, id: Uuid) -> Result<QueueEntry, QueueError> {
        self.queue_entries().by_id(id).await
    }

    async fn search(
        &self,
        search_key1: Option<i64>,
        search_key2: Option<i64>,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        self.queue_entries().search(search_key1, search_key2).await
    }

    async fn count_in_state(
        &self,
        queue_name: &str,
        state: QueueEntryState,
    ) -> Result<i64, QueueError> {
        self.queue_entries().count_in_state(queue_name, state).await
    }
}
