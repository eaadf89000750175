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

//! Claiming and completion operations for queue entries.
//!
//! The claim is the sole cross-worker synchronization primitive: one write
//! transaction selects eligible rows and stamps them with the claimer's
//! owner id and lease, so no two concurrent callers can claim the same row.
//! Completion calls are conditioned on the caller still owning the lease.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use std::time::Duration;
use uuid::Uuid;

use super::queue_entry::QueueEntryDAL;
use crate::database::schema::queue_entries;
use crate::error::QueueError;
use crate::models::queue_entry::{QueueEntry, QueueEntryRow, QueueEntryState};

impl<'a> QueueEntryDAL<'a> {
    /// Atomically claims up to `limit` ready entries of a queue.
    ///
    /// An entry is eligible when it is `AVAILABLE` with `effective_at <= now`,
    /// or `IN_PROCESSING` with an expired lease (abandoned by a worker that
    /// died mid-processing). Claimed entries transition to `IN_PROCESSING`
    /// with `owner = owner_id` and a fresh lease.
    ///
    /// SQLite lacks `FOR UPDATE SKIP LOCKED`, so the select and update run
    /// inside an IMMEDIATE transaction. Taking the write lock up front
    /// serializes concurrent claimers and closes the TOCTOU window between
    /// candidate selection and the ownership stamp.
    pub async fn claim_batch(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
        limit: usize,
        owner_id: &str,
        lease_duration: Duration,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let conn = self
            .dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let lease = chrono::Duration::from_std(lease_duration)
            .map_err(|e| QueueError::Configuration(format!("lease duration out of range: {e}")))?;

        let queue_name = queue_name.to_string();
        let owner = owner_id.to_string();
        let now_naive = now.naive_utc();
        let lease_naive = (now + lease).naive_utc();
        let limit = limit as i64;

        let rows: Vec<QueueEntryRow> = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let candidates: Vec<String> = queue_entries::table
                        .filter(queue_entries::queue_name.eq(&queue_name))
                        .filter(
                            queue_entries::state
                                .eq(QueueEntryState::Available.as_str())
                                .and(queue_entries::effective_at.le(now_naive))
                                .or(queue_entries::state
                                    .eq(QueueEntryState::InProcessing.as_str())
                                    .and(queue_entries::lease_expires_at.lt(now_naive))),
                        )
                        .order(queue_entries::effective_at.asc())
                        .limit(limit)
                        .select(queue_entries::id)
                        .load(conn)?;

                    if candidates.is_empty() {
                        return Ok(Vec::new());
                    }

                    diesel::update(
                        queue_entries::table.filter(queue_entries::id.eq_any(&candidates)),
                    )
                    .set((
                        queue_entries::state.eq(QueueEntryState::InProcessing.as_str()),
                        queue_entries::owner.eq(Some(owner.clone())),
                        queue_entries::lease_expires_at.eq(Some(lease_naive)),
                    ))
                    .execute(conn)?;

                    queue_entries::table
                        .filter(queue_entries::id.eq_any(&candidates))
                        .load::<QueueEntryRow>(conn)
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        if !rows.is_empty() {
            tracing::debug!(count = rows.len(), "Claimed queue entries");
        }

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    /// Marks an owned `IN_PROCESSING` entry as successfully processed.
    pub async fn mark_processed(
        &self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.finish(id, owner_id, now, QueueEntryState::Processed, None)
            .await
    }

    /// Dead-letters an owned entry after its retry budget is exhausted.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        owner_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.finish(
            id,
            owner_id,
            now,
            QueueEntryState::Failed,
            Some(error.to_string()),
        )
        .await
    }

    /// Marks an owned entry as consumed by the retry scheduler. The error
    /// that triggered the retry is kept for the audit trail.
    pub async fn mark_retried(
        &self,
        id: Uuid,
        owner_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.finish(
            id,
            owner_id,
            now,
            QueueEntryState::Retried,
            Some(error.to_string()),
        )
        .await
    }

    /// Removes an owned entry without processing it.
    pub async fn mark_removed(
        &self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.finish(id, owner_id, now, QueueEntryState::Removed, None)
            .await
    }

    /// Conditionally transitions an `IN_PROCESSING` entry to a terminal
    /// state.
    ///
    /// The update matches on id, state and owner in one statement. Zero rows
    /// updated means the lease was lost to a reclaiming worker (or the entry
    /// is already terminal), reported as [`QueueError::OwnershipLost`] so the
    /// caller can stand down instead of double-completing.
    async fn finish(
        &self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
        target: QueueEntryState,
        error: Option<String>,
    ) -> Result<(), QueueError> {
        let conn = self
            .dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let id_str = id.to_string();
        let owner = owner_id.to_string();
        let now_naive = now.naive_utc();

        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    queue_entries::table
                        .filter(queue_entries::id.eq(&id_str))
                        .filter(queue_entries::state.eq(QueueEntryState::InProcessing.as_str()))
                        .filter(queue_entries::owner.eq(Some(owner))),
                )
                .set((
                    queue_entries::state.eq(target.as_str()),
                    queue_entries::owner.eq(None::<String>),
                    queue_entries::lease_expires_at.eq(None::<NaiveDateTime>),
                    queue_entries::processed_at.eq(Some(now_naive)),
                    queue_entries::last_error.eq(error),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        if updated == 0 {
            return Err(QueueError::OwnershipLost(id));
        }

        tracing::debug!(entry_id = %id, state = %target, "Queue entry transitioned");
        Ok(())
    }
}
