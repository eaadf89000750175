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

//! Claimed-entry dispatch and outcome interpretation.
//!
//! One claimed entry, one handler invocation, one terminal transition. A
//! failure inside a handler never aborts the poller loop or affects other
//! entries in the batch; each entry's outcome is isolated here.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::error::{HandlerError, QueueError};
use crate::events::EventEnvelope;
use crate::handler::QueueHandler;
use crate::metrics::{MetricsSink, QueueCounter, QueueTimer};
use crate::models::queue_entry::QueueEntry;
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::store::QueueStore;

/// A queue as registered with the service: its name, handler and retry
/// policy.
pub struct RegisteredQueue {
    pub name: String,
    pub handler: Arc<dyn QueueHandler>,
    pub retry_policy: RetryPolicy,
}

/// Drives a claimed entry through handler invocation to its next state.
pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryScheduler,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let retry = RetryScheduler::new(store.clone(), clock.clone(), metrics.clone());
        Self {
            store,
            clock,
            metrics,
            retry,
        }
    }

    /// Invokes the queue's handler for one claimed entry and applies the
    /// outcome.
    ///
    /// Success marks the entry `PROCESSED`. A reported failure or a panic
    /// hands the entry to the retry scheduler. Losing the lease mid-flight
    /// is not an application error: another worker already owns the entry,
    /// so the late completion is logged at debug and swallowed.
    pub async fn dispatch_entry(
        &self,
        queue: &RegisteredQueue,
        entry: &QueueEntry,
        owner_id: &str,
    ) {
        let envelope = EventEnvelope::from_entry(entry);

        let started = Instant::now();
        let invocation = AssertUnwindSafe(queue.handler.handle(&envelope))
            .catch_unwind()
            .await;
        self.metrics
            .record_duration(QueueTimer::HandlerLatency, started.elapsed());

        let result = match invocation {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::new(panic_message(panic))),
        };

        match result {
            Ok(()) => {
                match self
                    .store
                    .mark_processed(entry.id, owner_id, self.clock.now())
                    .await
                {
                    Ok(()) => self.metrics.increment(QueueCounter::Processed, 1),
                    Err(QueueError::OwnershipLost(_)) => {
                        tracing::debug!(
                            entry_id = %entry.id,
                            "Lease lost before completion; another worker owns the entry"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            entry_id = %entry.id,
                            error = %e,
                            "Failed to mark entry processed"
                        );
                    }
                }
            }
            Err(handler_error) => {
                tracing::warn!(
                    entry_id = %entry.id,
                    queue = %queue.name,
                    attempt = entry.attempt,
                    error = %handler_error,
                    "Handler reported failure"
                );
                match self
                    .retry
                    .on_failure(entry, owner_id, &queue.retry_policy, &handler_error)
                    .await
                {
                    Ok(_) => {}
                    Err(QueueError::OwnershipLost(_)) => {
                        tracing::debug!(
                            entry_id = %entry.id,
                            "Lease lost during retry scheduling; another worker owns the entry"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            entry_id = %entry.id,
                            error = %e,
                            "Retry scheduling failed; entry will be reclaimed after lease expiry"
                        );
                    }
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
