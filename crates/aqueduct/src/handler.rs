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

//! Handler contract for queue consumers.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::EventEnvelope;

/// Processes claimed queue entries.
///
/// Delivery is at-least-once: a handler must be safe to invoke more than
/// once for the same logical event (dedupe on `entry_id` or `user_token` if
/// the work is not naturally idempotent). Returning `Err` routes the entry
/// through the retry scheduler; panics are caught by the dispatcher and
/// treated the same way.
///
/// A handler that never returns does not block the queue forever: its lease
/// expires and another worker reclaims the entry.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}
