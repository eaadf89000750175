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

//! The queue service facade.
//!
//! Owns the registered queues and their pollers. The bus queue exists from
//! construction with the [`SubscriberRouter`] as its handler; named
//! notification queues are registered by callers with their own handlers.
//! Queue registration happens before [`QueueService::start`]; configuration
//! errors are the only errors fatal to startup.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::QueueServiceConfig;
use crate::dal::DAL;
use crate::database::Database;
use crate::dispatcher::{Dispatcher, RegisteredQueue};
use crate::error::{ConfigError, QueueError};
use crate::events::{QueueEvent, SubscriberNotification};
use crate::handler::QueueHandler;
use crate::metrics::{MetricsSink, NoopMetricsSink};
use crate::models::queue_entry::NewQueueEntry;
use crate::poller::ClaimingPoller;
use crate::registry::subscriber::{SubscriberRegistry, SubscriberRouter};
use crate::retry::RetryPolicy;
use crate::store::QueueStore;

/// Name of the built-in bus queue. Bus events posted with
/// [`QueueService::post`] are delivered through hierarchy-based subscriber
/// dispatch.
pub const BUS_QUEUE: &str = "bus";

struct RuntimeHandles {
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
    pollers: Vec<tokio::task::JoinHandle<()>>,
}

/// Durable event delivery service: bus publishing, scheduled notifications,
/// and the background pollers that drive both.
pub struct QueueService {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    config: QueueServiceConfig,
    registry: Arc<SubscriberRegistry>,
    dispatcher: Arc<Dispatcher>,
    queues: RwLock<HashMap<String, Arc<RegisteredQueue>>>,
    runtime: Mutex<Option<RuntimeHandles>>,
    owner_id: String,
}

impl QueueService {
    /// Creates a service over a database with the system clock and no
    /// metrics.
    pub fn new(database: Database, config: QueueServiceConfig) -> Self {
        Self::with_components(
            Arc::new(DAL::new(database)),
            config,
            Arc::new(SystemClock),
            Arc::new(NoopMetricsSink),
        )
    }

    /// Creates a service with explicit collaborators. Tests inject a
    /// [`crate::TestClock`] and an [`crate::AtomicMetricsSink`] here.
    pub fn with_components(
        store: Arc<dyn QueueStore>,
        config: QueueServiceConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), clock.clone(), metrics.clone()));

        // The claim owner must be unique per worker across processes
        let owner_id = format!("worker-{}-{}", std::process::id(), Uuid::new_v4());

        let router = Arc::new(SubscriberRouter::with_metrics(
            registry.clone(),
            metrics.clone(),
        ));
        let mut queues = HashMap::new();
        queues.insert(
            BUS_QUEUE.to_string(),
            Arc::new(RegisteredQueue {
                name: BUS_QUEUE.to_string(),
                handler: router as Arc<dyn QueueHandler>,
                retry_policy: config.default_retry_policy().clone(),
            }),
        );

        Self {
            store,
            clock,
            metrics,
            config,
            registry,
            dispatcher,
            queues: RwLock::new(queues),
            runtime: Mutex::new(None),
            owner_id,
        }
    }

    /// The subscriber registry backing the bus queue.
    pub fn subscriber_registry(&self) -> Arc<SubscriberRegistry> {
        self.registry.clone()
    }

    /// This worker's claim owner identifier.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Registers a named notification queue with its handler.
    ///
    /// `retry_policy` falls back to the configured default when `None`.
    /// Must be called before [`QueueService::start`].
    pub fn create_queue(
        &self,
        name: &str,
        handler: Arc<dyn QueueHandler>,
        retry_policy: Option<RetryPolicy>,
    ) -> Result<(), ConfigError> {
        if self.runtime.lock().is_some() {
            return Err(ConfigError::AlreadyRunning);
        }

        let mut queues = self.queues.write();
        if queues.contains_key(name) {
            return Err(ConfigError::DuplicateQueue(name.to_string()));
        }

        queues.insert(
            name.to_string(),
            Arc::new(RegisteredQueue {
                name: name.to_string(),
                handler,
                retry_policy: retry_policy
                    .unwrap_or_else(|| self.config.default_retry_policy().clone()),
            }),
        );

        info!(queue = name, "Notification queue registered");
        Ok(())
    }

    /// Publishes a bus event, effective immediately.
    ///
    /// The event is wrapped in a [`SubscriberNotification`] envelope so the
    /// bus handler can recover its declared type for hierarchy resolution.
    pub async fn post<E: QueueEvent>(&self, event: &E) -> Result<Uuid, QueueError> {
        let now = self.clock.now();
        self.enqueue(BUS_QUEUE, event, now, now).await
    }

    /// Schedules an event on a registered queue for delivery at or after
    /// `effective_at`.
    pub async fn schedule_at<E: QueueEvent>(
        &self,
        queue_name: &str,
        event: &E,
        effective_at: DateTime<Utc>,
    ) -> Result<Uuid, QueueError> {
        if !self.queues.read().contains_key(queue_name) {
            return Err(ConfigError::UnknownQueue(queue_name.to_string()).into());
        }
        let now = self.clock.now();
        self.enqueue(queue_name, event, now, effective_at).await
    }

    async fn enqueue<E: QueueEvent>(
        &self,
        queue_name: &str,
        event: &E,
        now: DateTime<Utc>,
        effective_at: DateTime<Utc>,
    ) -> Result<Uuid, QueueError> {
        // Entries bound for the bus always carry the wrapper envelope,
        // including delayed ones scheduled directly onto it
        let payload = if queue_name == BUS_QUEUE {
            serde_json::to_string(&SubscriberNotification {
                event_type: event.event_type().to_string(),
                event: serde_json::to_value(event)?,
            })?
        } else {
            serde_json::to_string(event)?
        };

        self.store
            .insert(NewQueueEntry {
                queue_name: queue_name.to_string(),
                event_type: event.event_type().to_string(),
                payload,
                user_token: event.user_token(),
                search_key1: event.search_key1(),
                search_key2: event.search_key2(),
                attempt: 0,
                created_at: now,
                effective_at,
            })
            .await
    }

    /// Starts one claiming poller per registered queue. Idempotent.
    pub fn start(&self) {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        let queues: Vec<Arc<RegisteredQueue>> = self.queues.read().values().cloned().collect();
        let pollers = queues
            .into_iter()
            .map(|queue| {
                ClaimingPoller {
                    queue,
                    store: self.store.clone(),
                    clock: self.clock.clone(),
                    metrics: self.metrics.clone(),
                    dispatcher: self.dispatcher.clone(),
                    owner_id: self.owner_id.clone(),
                    poll_interval: self.config.poll_interval(),
                    batch_size: self.config.batch_size(),
                    lease_duration: self.config.lease_duration(),
                    shutdown: shutdown.clone(),
                    notify: notify.clone(),
                }
                .spawn()
            })
            .collect();

        *runtime = Some(RuntimeHandles {
            shutdown,
            notify,
            pollers,
        });

        info!(owner = %self.owner_id, "Queue service started");
    }

    /// Stops all pollers and waits for them to finish their current batch.
    pub async fn shutdown(&self) {
        let handles = self.runtime.lock().take();
        let Some(handles) = handles else {
            return;
        };

        handles.shutdown.store(true, Ordering::SeqCst);
        handles.notify.notify_waiters();

        for poller in handles.pollers {
            let _ = poller.await;
        }

        info!("Queue service stopped");
    }
}
