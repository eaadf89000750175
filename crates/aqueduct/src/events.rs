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

//! Event contracts and the envelope delivered to handlers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::queue_entry::QueueEntry;

/// A producible event.
///
/// `event_type` is the declared type tag used for dispatch resolution; it
/// must match a type described to the [`crate::SubscriberRegistry`] for
/// hierarchy-based fan-out to find its subscribers. The user token and
/// search keys are propagated onto the durable entry untouched.
pub trait QueueEvent: Serialize {
    fn event_type(&self) -> &'static str;

    fn user_token(&self) -> Option<Uuid> {
        None
    }

    fn search_key1(&self) -> Option<i64> {
        None
    }

    fn search_key2(&self) -> Option<i64> {
        None
    }
}

/// What a handler receives for one claimed entry.
///
/// The same envelope instance is passed to every resolved subscriber action,
/// never a re-serialized copy.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Id of the durable entry being delivered.
    pub entry_id: Uuid,
    /// Queue the entry was claimed from.
    pub queue_name: String,
    /// Declared type of the payload.
    pub event_type: String,
    /// Serialized event body.
    pub payload: String,
    /// The entry's effective time.
    pub event_time: DateTime<Utc>,
    /// Correlation token from the producing operation.
    pub user_token: Option<Uuid>,
    pub search_key1: Option<i64>,
    pub search_key2: Option<i64>,
    /// Which delivery attempt this is, starting at 0.
    pub attempt: i32,
}

impl EventEnvelope {
    pub fn from_entry(entry: &QueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            queue_name: entry.queue_name.clone(),
            event_type: entry.event_type.clone(),
            payload: entry.payload.clone(),
            event_time: entry.effective_at,
            user_token: entry.user_token,
            search_key1: entry.search_key1,
            search_key2: entry.search_key2,
            attempt: entry.attempt,
        }
    }

    /// Deserializes the payload into a concrete event type.
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Wire wrapper for bus events routed through the subscriber queue handler.
///
/// Bus entries carry this envelope as their payload so the router can
/// recover the concrete event type for hierarchy resolution. An entry whose
/// payload does not parse as this wrapper is logged and dropped at dispatch
/// time rather than retried; a structurally invalid payload cannot succeed
/// later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberNotification {
    pub event_type: String,
    pub event: serde_json::Value,
}
