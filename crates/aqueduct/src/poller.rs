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

//! Background claiming poller.
//!
//! One poller per queue, potentially many across processes. Each iteration
//! claims a bounded batch of ready entries and hands them to the dispatcher
//! sequentially. Storage errors are logged and the loop continues; only the
//! shutdown signal stops a poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::clock::Clock;
use crate::dispatcher::{Dispatcher, RegisteredQueue};
use crate::metrics::{MetricsSink, QueueCounter};
use crate::store::QueueStore;

/// Polls one queue for ready entries on a fixed interval.
pub struct ClaimingPoller {
    pub(crate) queue: Arc<RegisteredQueue>,
    pub(crate) store: Arc<dyn QueueStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) owner_id: String,
    pub(crate) poll_interval: Duration,
    pub(crate) batch_size: usize,
    pub(crate) lease_duration: Duration,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) notify: Arc<Notify>,
}

impl ClaimingPoller {
    /// Spawns the poll loop onto the runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        info!(queue = %self.queue.name, owner = %self.owner_id, "Queue poller started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.notify.notified() => {}
            }

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            self.poll_once().await;
        }

        info!(queue = %self.queue.name, "Queue poller stopped");
    }

    /// One claim-and-dispatch cycle.
    async fn poll_once(&self) {
        let now = self.clock.now();
        let entries = match self
            .store
            .claim_batch(
                &self.queue.name,
                now,
                self.batch_size,
                &self.owner_id,
                self.lease_duration,
            )
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                // A storage hiccup must not kill the worker
                error!(
                    queue = %self.queue.name,
                    error = %e,
                    "Claim batch failed; retrying on next poll"
                );
                return;
            }
        };

        if entries.is_empty() {
            return;
        }

        self.metrics
            .increment(QueueCounter::Claimed, entries.len() as u64);

        // Claimed entries are leased to this worker; finish the batch even
        // if shutdown was requested mid-way
        for entry in &entries {
            self.dispatcher
                .dispatch_entry(&self.queue, entry, &self.owner_id)
                .await;
        }
    }
}
