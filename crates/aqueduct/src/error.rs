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

//! Error types for queue storage, configuration and handler execution.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the durable store and the queue runtime.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to obtain a connection from the pool.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// A query or transaction failed.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Schema migrations could not be applied.
    #[error("Migration error: {0}")]
    Migration(String),

    /// No entry exists with the given id.
    #[error("Queue entry {0} not found")]
    EntryNotFound(Uuid),

    /// A completion call was made for an entry whose lease this worker no
    /// longer holds. Another worker has reclaimed it; the caller must not
    /// treat the entry as its own.
    #[error("Lease on queue entry {0} is no longer held by this worker")]
    OwnershipLost(Uuid),

    /// A row carried a state string that is not part of the lifecycle.
    #[error("Invalid queue entry state '{0}'")]
    InvalidState(String),

    /// A stored identifier could not be parsed.
    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),

    /// Event payload serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested operation conflicts with the service configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A supplied duration or setting was out of range.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Configuration errors, reported at registration time before any polling
/// starts. These are the only errors that are fatal to startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A queue with this name is already registered.
    #[error("Queue '{0}' is already registered")]
    DuplicateQueue(String),

    /// `subscribe` was called twice for the same declared event type.
    #[error("A subscriber action is already registered for event type '{0}'")]
    DuplicateSubscription(String),

    /// No queue with this name has been registered.
    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),

    /// Queues cannot be added once the pollers are running.
    #[error("Queue service is already running")]
    AlreadyRunning,
}

/// A failure reported by a queue handler.
///
/// Any `HandlerError` returned from [`crate::QueueHandler::handle`] routes
/// the entry through the retry scheduler; the message ends up in the entry's
/// `last_error` column when the retry budget is exhausted.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
