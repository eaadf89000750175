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

//! Metrics sink consumed by the dispatcher.
//!
//! Fire-and-forget: the core reports counts and durations and never reads
//! anything back, so sink internals cannot affect correctness. The default
//! sink discards everything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters the dispatcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCounter {
    /// Entries returned by a claim batch.
    Claimed,
    /// Entries completed successfully.
    Processed,
    /// Entries dead-lettered after exhausting retries.
    Failed,
    /// Entries re-enqueued for a later attempt.
    Retried,
    /// Entries dropped for a malformed dispatch envelope.
    Dropped,
}

/// Timers the dispatcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTimer {
    /// Wall-clock duration of one handler invocation.
    HandlerLatency,
}

/// Receives queue metrics. Implementations must be cheap and must not fail.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, counter: QueueCounter, value: u64);
    fn record_duration(&self, timer: QueueTimer, duration: Duration);
}

/// Discards all metrics. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _counter: QueueCounter, _value: u64) {}

    fn record_duration(&self, _timer: QueueTimer, _duration: Duration) {}
}

/// In-process sink backed by atomic counters.
///
/// Useful in tests and for lightweight health reporting without an external
/// metrics registry.
#[derive(Debug, Default)]
pub struct AtomicMetricsSink {
    claimed: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    handler_nanos: AtomicU64,
    handler_samples: AtomicU64,
}

impl AtomicMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn handler_samples(&self) -> u64 {
        self.handler_samples.load(Ordering::Relaxed)
    }

    /// Mean handler latency across all recorded samples.
    pub fn mean_handler_latency(&self) -> Option<Duration> {
        let samples = self.handler_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return None;
        }
        let nanos = self.handler_nanos.load(Ordering::Relaxed);
        Some(Duration::from_nanos(nanos / samples))
    }
}

impl MetricsSink for AtomicMetricsSink {
    fn increment(&self, counter: QueueCounter, value: u64) {
        let cell = match counter {
            QueueCounter::Claimed => &self.claimed,
            QueueCounter::Processed => &self.processed,
            QueueCounter::Failed => &self.failed,
            QueueCounter::Retried => &self.retried,
            QueueCounter::Dropped => &self.dropped,
        };
        cell.fetch_add(value, Ordering::Relaxed);
    }

    fn record_duration(&self, timer: QueueTimer, duration: Duration) {
        match timer {
            QueueTimer::HandlerLatency => {
                self.handler_nanos
                    .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
                self.handler_samples.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
