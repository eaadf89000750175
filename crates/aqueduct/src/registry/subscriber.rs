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

//! Subscriber registry and the bus queue handler.
//!
//! A subscriber registers one action per declared event type. Dispatching an
//! event resolves the concrete type's hierarchy closure and invokes the
//! action of every type in it that has one, in closure order, so a
//! subscriber can register at any level of specificity without the producer
//! knowing which level is registered.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::hierarchy::{HierarchyCache, TypeTable};
use crate::error::{ConfigError, HandlerError};
use crate::events::{EventEnvelope, SubscriberNotification};
use crate::handler::QueueHandler;
use crate::metrics::{MetricsSink, NoopMetricsSink, QueueCounter};

/// A subscriber's action, invoked for every matching event.
#[async_trait]
pub trait SubscriberAction: Send + Sync {
    async fn run(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}

/// Maps declared event types to subscriber actions and resolves dispatch
/// sets through the hierarchy cache.
///
/// Created at startup, passed explicitly to the components that need it;
/// nothing here is a process-wide static, which keeps registries resettable
/// between test cases.
#[derive(Default)]
pub struct SubscriberRegistry {
    types: RwLock<TypeTable>,
    actions: RwLock<HashMap<String, Arc<dyn SubscriberAction>>>,
    hierarchy: HierarchyCache,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the direct ancestors of an event type. See
    /// [`TypeTable::describe`].
    pub fn describe_type(&self, name: &str, parents: &[&str]) {
        self.types.write().describe(name, parents);
    }

    /// Registers the action for a declared event type.
    ///
    /// Each type maps to exactly one action; re-registering the same type is
    /// a configuration error, reported here rather than silently
    /// overwriting.
    pub fn subscribe(
        &self,
        event_type: &str,
        action: Arc<dyn SubscriberAction>,
    ) -> Result<(), ConfigError> {
        let mut actions = self.actions.write();
        if actions.contains_key(event_type) {
            return Err(ConfigError::DuplicateSubscription(event_type.to_string()));
        }
        actions.insert(event_type.to_string(), action);
        tracing::debug!(event_type, "Subscriber action registered");
        Ok(())
    }

    /// Resolves the ordered hierarchy closure of a concrete event type.
    pub fn resolve(&self, concrete: &str) -> Arc<[String]> {
        let types = self.types.read();
        self.hierarchy.flatten(concrete, &types)
    }

    /// Test hook: how many closures the cache has computed.
    pub fn hierarchy_computations(&self) -> u64 {
        self.hierarchy.computations()
    }

    /// Invokes every action registered for the event's closure, in closure
    /// order, with the same envelope instance.
    ///
    /// The first failing action aborts the remainder and surfaces the error
    /// to the dispatcher, which routes the whole entry through the retry
    /// scheduler.
    pub async fn dispatch(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let closure = self.resolve(&event.event_type);
        let targets: Vec<Arc<dyn SubscriberAction>> = {
            let actions = self.actions.read();
            closure
                .iter()
                .filter_map(|type_name| actions.get(type_name.as_str()).cloned())
                .collect()
        };

        for action in targets {
            action.run(event).await?;
        }
        Ok(())
    }
}

/// The bus queue handler: unwraps the [`SubscriberNotification`] envelope
/// and fans out through the registry.
pub struct SubscriberRouter {
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<dyn MetricsSink>,
}

impl SubscriberRouter {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self::with_metrics(registry, Arc::new(NoopMetricsSink))
    }

    pub fn with_metrics(registry: Arc<SubscriberRegistry>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { registry, metrics }
    }
}

#[async_trait]
impl QueueHandler for SubscriberRouter {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let wrapper: SubscriberNotification = match serde_json::from_str(&event.payload) {
            Ok(wrapper) => wrapper,
            Err(e) => {
                // Malformed envelopes are dropped, not retried: a
                // structurally invalid payload cannot succeed later and
                // must not jam the poller
                tracing::error!(
                    entry_id = %event.entry_id,
                    error = %e,
                    "Subscriber queue received an unexpected payload; dropping entry"
                );
                self.metrics.increment(QueueCounter::Dropped, 1);
                return Ok(());
            }
        };

        let inner = EventEnvelope {
            entry_id: event.entry_id,
            queue_name: event.queue_name.clone(),
            event_type: wrapper.event_type,
            payload: wrapper.event.to_string(),
            event_time: event.event_time,
            user_token: event.user_token,
            search_key1: event.search_key1,
            search_key2: event.search_key2,
            attempt: event.attempt,
        };

        self.registry.dispatch(&inner).await
    }
}
