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

//! Configuration for the queue service.
//!
//! Poll interval, batch size and lease duration trade delivery latency for
//! storage load; they are inputs, not internal constants.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for a [`crate::QueueService`].
///
/// # Construction
///
/// Use [`QueueServiceConfig::builder()`]:
///
/// ```rust,ignore
/// let config = QueueServiceConfig::builder()
///     .poll_interval(Duration::from_millis(500))
///     .batch_size(20)
///     .build();
/// ```
///
/// Or the defaults: 3s polling, batches of 10, 5 minute leases.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct QueueServiceConfig {
    poll_interval: Duration,
    batch_size: usize,
    lease_duration: Duration,
    default_retry_policy: RetryPolicy,
}

impl QueueServiceConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> QueueServiceConfigBuilder {
        QueueServiceConfigBuilder::default()
    }

    /// How often each queue poller attempts a claim batch.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Maximum number of entries claimed per poll.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// How long a claim remains owned before another worker may reclaim it.
    ///
    /// Must comfortably exceed the slowest expected handler; a worker that
    /// outlives its lease will find its completion call rejected.
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Retry policy applied to queues registered without an explicit one,
    /// including the bus.
    pub fn default_retry_policy(&self) -> &RetryPolicy {
        &self.default_retry_policy
    }
}

impl Default for QueueServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`QueueServiceConfig`].
#[derive(Debug, Clone)]
pub struct QueueServiceConfigBuilder {
    poll_interval: Duration,
    batch_size: usize,
    lease_duration: Duration,
    default_retry_policy: RetryPolicy,
}

impl Default for QueueServiceConfigBuilder {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            batch_size: 10,
            lease_duration: Duration::from_secs(300),
            default_retry_policy: RetryPolicy::default(),
        }
    }
}

impl QueueServiceConfigBuilder {
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    pub fn build(self) -> QueueServiceConfig {
        QueueServiceConfig {
            poll_interval: self.poll_interval,
            batch_size: self.batch_size,
            lease_duration: self.lease_duration,
            default_retry_policy: self.default_retry_policy,
        }
    }
}
