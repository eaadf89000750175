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

//! Retry scheduling.
//!
//! A failed handler invocation never retries in place: each attempt is a
//! new, independently observable queue entry, which keeps the audit trail
//! complete (one row per attempt) and avoids lease-reuse races. The
//! replacement entry is durably inserted before the original is consumed,
//! so a crash between the two produces a duplicate delivery, never a lost
//! event.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{HandlerError, QueueError};
use crate::metrics::{MetricsSink, QueueCounter};
use crate::models::queue_entry::{NewQueueEntry, QueueEntry};
use crate::store::QueueStore;

/// Maps a retry attempt number to the delay before the next attempt becomes
/// eligible.
#[derive(Clone)]
pub enum BackoffPolicy {
    /// The same delay for every attempt.
    Fixed(Duration),
    /// `step`, `2*step`, `3*step`, ...
    Linear { step: Duration },
    /// `base`, `2*base`, `4*base`, ... capped at `cap`.
    Exponential { base: Duration, cap: Duration },
    /// Caller-supplied function from attempt number to delay.
    Custom(Arc<dyn Fn(i32) -> Duration + Send + Sync>),
}

impl BackoffPolicy {
    /// Delay before the attempt after `attempt` becomes eligible.
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let n = attempt.max(0) as u32;
        match self {
            BackoffPolicy::Fixed(delay) => *delay,
            BackoffPolicy::Linear { step } => step.saturating_mul(n + 1),
            BackoffPolicy::Exponential { base, cap } => {
                let factor = 2u32.saturating_pow(n.min(20));
                match base.checked_mul(factor) {
                    Some(delay) => delay.min(*cap),
                    None => *cap,
                }
            }
            BackoffPolicy::Custom(f) => f(attempt),
        }
    }
}

impl fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffPolicy::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            BackoffPolicy::Linear { step } => {
                f.debug_struct("Linear").field("step", step).finish()
            }
            BackoffPolicy::Exponential { base, cap } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("cap", cap)
                .finish(),
            BackoffPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Bounded retry policy for a queue.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after which the entry is dead-lettered. An entry whose
    /// `attempt` counter has reached this value is marked `FAILED` instead
    /// of being re-enqueued.
    pub max_attempts: i32,
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    pub fn new(max_attempts: i32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::Exponential {
                base: Duration::from_secs(10),
                cap: Duration::from_secs(600),
            },
        }
    }
}

/// What the retry scheduler decided for a failed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDisposition {
    /// A replacement entry was inserted; the original is consumed.
    Rescheduled {
        entry_id: Uuid,
        attempt: i32,
        effective_at: DateTime<Utc>,
    },
    /// The retry budget is exhausted; the original is dead-lettered.
    DeadLettered,
}

/// Turns handler failures into rescheduled future attempts.
pub struct RetryScheduler {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
}

impl RetryScheduler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            clock,
            metrics,
        }
    }

    /// Handles a failed delivery of `entry`.
    ///
    /// Under budget: inserts a replacement entry into the originating queue
    /// carrying the same payload, user token and search keys with
    /// `attempt + 1` and `effective_at = now + backoff(attempt)`, then marks
    /// the original `RETRIED`. Over budget: marks the original `FAILED`
    /// (dead-letter), recording the error for operator inspection.
    pub async fn on_failure(
        &self,
        entry: &QueueEntry,
        owner_id: &str,
        policy: &RetryPolicy,
        error: &HandlerError,
    ) -> Result<RetryDisposition, QueueError> {
        let now = self.clock.now();

        if entry.attempt >= policy.max_attempts {
            self.store
                .mark_failed(entry.id, owner_id, error.message(), now)
                .await?;
            self.metrics.increment(QueueCounter::Failed, 1);
            tracing::warn!(
                entry_id = %entry.id,
                queue = %entry.queue_name,
                attempt = entry.attempt,
                error = %error,
                "Retry budget exhausted; entry dead-lettered"
            );
            return Ok(RetryDisposition::DeadLettered);
        }

        let delay = policy.backoff.delay_for(entry.attempt);
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| QueueError::Configuration(format!("backoff delay out of range: {e}")))?;
        let effective_at = now + delay;
        let next_attempt = entry.attempt + 1;

        let replacement = NewQueueEntry {
            queue_name: entry.queue_name.clone(),
            event_type: entry.event_type.clone(),
            payload: entry.payload.clone(),
            user_token: entry.user_token,
            search_key1: entry.search_key1,
            search_key2: entry.search_key2,
            attempt: next_attempt,
            created_at: now,
            effective_at,
        };

        let entry_id = self.store.insert(replacement).await?;
        self.store
            .mark_retried(entry.id, owner_id, error.message(), now)
            .await?;
        self.metrics.increment(QueueCounter::Retried, 1);

        tracing::info!(
            entry_id = %entry.id,
            replacement_id = %entry_id,
            queue = %entry.queue_name,
            attempt = next_attempt,
            effective_at = %effective_at,
            "Handler failed; attempt rescheduled"
        );

        Ok(RetryDisposition::Rescheduled {
            entry_id,
            attempt: next_attempt,
            effective_at,
        })
    }
}
