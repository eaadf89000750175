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

//! # Aqueduct
//!
//! A durable event-delivery library: a persistence-backed queue that delivers
//! immediate pub/sub "bus" events and time-scheduled notification events to
//! registered handlers with at-least-once guarantees, plus a retry layer that
//! turns handler failures into rescheduled future attempts.
//!
//! The moving parts:
//!
//! - [`Database`] / [`dal::DAL`]: SQLite-backed durable store for queue
//!   entries, including the atomic multi-row claim that makes the queue safe
//!   to poll from many workers against one shared database.
//! - [`QueueService`]: the facade. Register named queues with handlers,
//!   `post` bus events, `schedule_at` delayed notifications, then `start`
//!   the background pollers.
//! - [`SubscriberRegistry`] / [`SubscriberRouter`]: type-hierarchy based
//!   fan-out for bus events. A subscriber registered on an ancestor type
//!   receives all events whose declared ancestry includes that type.
//! - [`retry::RetryScheduler`]: on handler failure, re-enqueues a new delayed
//!   entry with an incremented attempt counter, or dead-letters the entry
//!   when its retry budget is exhausted.
//!
//! Delivery is at-least-once: a worker that dies mid-processing loses its
//! lease, and another worker reclaims the entry. Handlers must be idempotent
//! or dedupe on entry id / user token.
//!
//! # Example
//!
//! ```rust,ignore
//! use aqueduct::{Database, QueueService, QueueServiceConfig};
//!
//! let database = Database::new("aqueduct.db");
//! database.run_migrations().await?;
//!
//! let service = QueueService::new(database, QueueServiceConfig::default());
//! service.subscriber_registry().describe_type("InvoicePaid", &["InvoiceEvent"]);
//! service.subscriber_registry().subscribe("InvoiceEvent", my_action)?;
//! service.start();
//!
//! service.post(&InvoicePaid { .. }).await?;
//! ```

pub mod clock;
pub mod config;
pub mod dal;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod registry;
pub mod retry;
pub mod service;
pub mod store;

pub use clock::{Clock, SystemClock, TestClock};
pub use config::QueueServiceConfig;
pub use dal::DAL;
pub use database::Database;
pub use error::{ConfigError, HandlerError, QueueError};
pub use events::{EventEnvelope, QueueEvent, SubscriberNotification};
pub use handler::QueueHandler;
pub use logging::init_logging;
pub use metrics::{AtomicMetricsSink, MetricsSink, NoopMetricsSink, QueueCounter, QueueTimer};
pub use models::queue_entry::{NewQueueEntry, QueueEntry, QueueEntryState};
pub use registry::subscriber::{SubscriberAction, SubscriberRegistry, SubscriberRouter};
pub use retry::{BackoffPolicy, RetryPolicy};
pub use service::{QueueService, BUS_QUEUE};
pub use store::QueueStore;
