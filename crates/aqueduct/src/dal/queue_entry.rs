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

//! Insert and read operations for queue entries.

use diesel::prelude::*;
use uuid::Uuid;

use super::DAL;
use crate::database::schema::queue_entries;
use crate::error::QueueError;
use crate::models::queue_entry::{NewQueueEntry, QueueEntry, QueueEntryRow, QueueEntryState};

/// Data access operations for queue entries.
pub struct QueueEntryDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> QueueEntryDAL<'a> {
    /// Durably persists a new entry in `AVAILABLE` state and returns its id.
    ///
    /// A future `effective_at` keeps the entry invisible to claimers until
    /// that time passes.
    pub async fn insert(&self, entry: NewQueueEntry) -> Result<Uuid, QueueError> {
        let conn = self
            .dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let id = Uuid::new_v4();
        let row = entry.into_row(id);

        conn.interact(move |conn| {
            diesel::insert_into(queue_entries::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        tracing::debug!(entry_id = %id, "Queue entry inserted");
        Ok(id)
    }

    /// Reads a single entry by id.
    pub async fn by_id(&self, id: Uuid) -> Result<QueueEntry, QueueError> {
        let conn = self
            .dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let id_str = id.to_string();
        let row: Option<QueueEntryRow> = conn
            .interact(move |conn| {
                queue_entries::table
                    .find(id_str)
                    .first::<QueueEntryRow>(conn)
                    .optional()
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        row.ok_or(QueueError::EntryNotFound(id))?.try_into()
    }

    /// Filtered read by search keys, for operational tooling.
    ///
    /// The claiming protocol never consults search keys; they exist so
    /// callers can scope queries to a tenant or account.
    pub async fn search(
        &self,
        search_key1: Option<i64>,
        search_key2: Option<i64>,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let conn = self
            .dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let rows: Vec<QueueEntryRow> = conn
            .interact(move |conn| {
                let mut query = queue_entries::table.into_boxed();
                if let Some(key1) = search_key1 {
                    query = query.filter(queue_entries::search_key1.eq(key1));
                }
                if let Some(key2) = search_key2 {
                    query = query.filter(queue_entries::search_key2.eq(key2));
                }
                query
                    .order(queue_entries::created_at.asc())
                    .load::<QueueEntryRow>(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    /// Counts entries of a queue currently in the given state.
    pub async fn count_in_state(
        &self,
        queue_name: &str,
        state: QueueEntryState,
    ) -> Result<i64, QueueError> {
        let conn = self
            .dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let queue_name = queue_name.to_string();
        let count = conn
            .interact(move |conn| {
                queue_entries::table
                    .filter(queue_entries::queue_name.eq(&queue_name))
                    .filter(queue_entries::state.eq(state.as_str()))
                    .count()
                    .get_result::<i64>(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(count)
    }
}
