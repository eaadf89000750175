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

//! Data Access Layer for the durable queue entry store.
//!
//! The DAL is the shipped implementation of the [`crate::store::QueueStore`]
//! contract. Entry state lives in the database and nothing here caches it
//! beyond the scope of one claim-process-complete cycle.

pub mod claiming;
pub mod queue_entry;

use crate::database::Database;

/// Data access facade over a [`Database`].
#[derive(Clone, Debug)]
pub struct DAL {
    pub(crate) database: Database,
}

impl DAL {
    /// Creates a new DAL instance.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Access to queue entry operations.
    pub fn queue_entries(&self) -> queue_entry::QueueEntryDAL<'_> {
        queue_entry::QueueEntryDAL { dal: self }
    }
}
