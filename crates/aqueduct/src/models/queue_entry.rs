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

//! Queue Entry Model
//!
//! One row per scheduled unit of work. Row structs use SQLite-native types
//! (TEXT ids, naive timestamps); the domain types below carry `Uuid` and
//! `DateTime<Utc>` and are what the rest of the core works with. Conversion
//! happens at the DAL boundary.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use std::fmt;
use uuid::Uuid;

use crate::error::QueueError;

/// Lifecycle state of a queue entry.
///
/// Transitions are monotonic except for the `InProcessing` -> `Available`
/// cycle permitted by lease expiry: an abandoned entry becomes claimable
/// again once its lease runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEntryState {
    /// Eligible for claiming once `effective_at` has passed.
    Available,
    /// Claimed by a worker holding a live lease.
    InProcessing,
    /// Handled successfully. Terminal.
    Processed,
    /// Consumed by the retry scheduler; a replacement entry carries the next
    /// attempt. Terminal for this row.
    Retried,
    /// Retry budget exhausted; dead-lettered. Terminal.
    Failed,
    /// Removed operationally without processing. Terminal.
    Removed,
}

impl QueueEntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEntryState::Available => "AVAILABLE",
            QueueEntryState::InProcessing => "IN_PROCESSING",
            QueueEntryState::Processed => "PROCESSED",
            QueueEntryState::Retried => "RETRIED",
            QueueEntryState::Failed => "FAILED",
            QueueEntryState::Removed => "REMOVED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, QueueError> {
        match s {
            "AVAILABLE" => Ok(QueueEntryState::Available),
            "IN_PROCESSING" => Ok(QueueEntryState::InProcessing),
            "PROCESSED" => Ok(QueueEntryState::Processed),
            "RETRIED" => Ok(QueueEntryState::Retried),
            "FAILED" => Ok(QueueEntryState::Failed),
            "REMOVED" => Ok(QueueEntryState::Removed),
            other => Err(QueueError::InvalidState(other.to_string())),
        }
    }
}

impl fmt::Display for QueueEntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable queue entry as seen by the core.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Globally unique identifier, assigned at creation.
    pub id: Uuid,
    /// Logical queue this entry belongs to.
    pub queue_name: String,
    /// Declared type of the payload, used for dispatch resolution.
    pub event_type: String,
    /// Serialized event body.
    pub payload: String,
    /// Correlation identifier propagated from the producing operation.
    pub user_token: Option<Uuid>,
    /// Opaque partition identifier for filtered queries.
    pub search_key1: Option<i64>,
    /// Opaque partition identifier for filtered queries.
    pub search_key2: Option<i64>,
    /// Current lifecycle state.
    pub state: QueueEntryState,
    /// Worker currently holding the lease, if any.
    pub owner: Option<String>,
    /// Time after which another worker may reclaim this entry.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Retry attempt counter, starts at 0.
    pub attempt: i32,
    /// Most recent handler error, recorded on failure.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Earliest time the entry becomes eligible for claiming.
    pub effective_at: DateTime<Utc>,
    /// Timestamp of the terminal transition, if reached.
    pub processed_at: Option<DateTime<Utc>>,
}

/// Fields required to create a new queue entry.
///
/// State, owner and lease columns are owned by the store and the claiming
/// protocol; producers only describe the work.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub queue_name: String,
    pub event_type: String,
    pub payload: String,
    pub user_token: Option<Uuid>,
    pub search_key1: Option<i64>,
    pub search_key2: Option<i64>,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
    pub effective_at: DateTime<Utc>,
}

/// Database row for a queue entry.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::database::schema::queue_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueueEntryRow {
    pub id: String,
    pub queue_name: String,
    pub event_type: String,
    pub payload: String,
    pub user_token: Option<String>,
    pub search_key1: Option<i64>,
    pub search_key2: Option<i64>,
    pub state: String,
    pub owner: Option<String>,
    pub lease_expires_at: Option<NaiveDateTime>,
    pub attempt: i32,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub effective_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

/// Insertable row for a new queue entry.
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::database::schema::queue_entries)]
pub struct NewQueueEntryRow {
    pub id: String,
    pub queue_name: String,
    pub event_type: String,
    pub payload: String,
    pub user_token: Option<String>,
    pub search_key1: Option<i64>,
    pub search_key2: Option<i64>,
    pub state: String,
    pub attempt: i32,
    pub created_at: NaiveDateTime,
    pub effective_at: NaiveDateTime,
}

fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

impl TryFrom<QueueEntryRow> for QueueEntry {
    type Error = QueueError;

    fn try_from(row: QueueEntryRow) -> Result<Self, Self::Error> {
        let user_token = row.user_token.as_deref().map(Uuid::parse_str).transpose()?;

        Ok(QueueEntry {
            id: Uuid::parse_str(&row.id)?,
            queue_name: row.queue_name,
            event_type: row.event_type,
            payload: row.payload,
            user_token,
            search_key1: row.search_key1,
            search_key2: row.search_key2,
            state: QueueEntryState::parse(&row.state)?,
            owner: row.owner,
            lease_expires_at: row.lease_expires_at.map(to_utc),
            attempt: row.attempt,
            last_error: row.last_error,
            created_at: to_utc(row.created_at),
            effective_at: to_utc(row.effective_at),
            processed_at: row.processed_at.map(to_utc),
        })
    }
}

impl NewQueueEntry {
    pub(crate) fn into_row(self, id: Uuid) -> NewQueueEntryRow {
        NewQueueEntryRow {
            id: id.to_string(),
            queue_name: self.queue_name,
            event_type: self.event_type,
            payload: self.payload,
            user_token: self.user_token.map(|t| t.to_string()),
            search_key1: self.search_key1,
            search_key2: self.search_key2,
            state: QueueEntryState::Available.as_str().to_string(),
            attempt: self.attempt,
            created_at: self.created_at.naive_utc(),
            effective_at: self.effective_at.naive_utc(),
        }
    }
}
