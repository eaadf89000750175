/*
 *  Copyright 2025 Colliery Software
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

//! SQLite connection pool management.
//!
//! Provides an async connection pool built on `deadpool-diesel`. The pool is
//! `Clone` and can be shared freely; each clone references the same
//! underlying pool. Accepts a file path, a `sqlite://` URL, or `:memory:`.

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use tracing::info;

use crate::error::QueueError;

/// A pool of SQLite connections shared by every component of the queue.
///
/// SQLite has limited concurrent write support even in WAL mode, so the pool
/// holds a single connection; concurrent claimers serialize on it instead of
/// failing with "database is locked". Cross-process deployments rely on WAL
/// and the busy timeout set in [`Database::run_migrations`].
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Database(sqlite)")
    }
}

impl Database {
    /// Creates a new connection pool for the given database location.
    ///
    /// # Arguments
    ///
    /// * `connection_string` - A file path, `sqlite://` URL, or `:memory:`
    ///
    /// # Panics
    ///
    /// Panics if the connection pool cannot be created.
    pub fn new(connection_string: &str) -> Self {
        let connection_url = Self::build_sqlite_url(connection_string);
        let manager = Manager::new(connection_url, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .expect("Failed to create SQLite connection pool");

        info!("SQLite connection pool initialized");

        Self { pool }
    }

    /// Gets a connection from the pool.
    pub async fn get_connection(
        &self,
    ) -> Result<
        deadpool::managed::Object<Manager>,
        deadpool::managed::PoolError<deadpool_diesel::Error>,
    > {
        self.pool.get().await
    }

    /// Runs pending schema migrations and sets the SQLite pragmas the queue
    /// relies on.
    ///
    /// WAL mode allows concurrent reads during writes; the busy timeout makes
    /// writers wait instead of immediately failing when another process holds
    /// the write lock.
    pub async fn run_migrations(&self) -> Result<(), QueueError> {
        let conn = self
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        conn.interact(|conn| {
            use diesel::prelude::*;
            use diesel_migrations::MigrationHarness;

            diesel::sql_query("PRAGMA journal_mode=WAL;")
                .execute(conn)
                .map_err(|e| e.to_string())?;
            diesel::sql_query("PRAGMA busy_timeout=30000;")
                .execute(conn)
                .map_err(|e| e.to_string())?;

            conn.run_pending_migrations(super::MIGRATIONS)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| QueueError::ConnectionPool(e.to_string()))?
        .map_err(QueueError::Migration)?;

        Ok(())
    }

    /// Builds a SQLite connection URL, stripping a `sqlite://` prefix if
    /// present.
    fn build_sqlite_url(connection_string: &str) -> String {
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }
}
