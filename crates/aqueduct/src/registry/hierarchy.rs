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

//! Declared type ancestry and the memoized hierarchy closure cache.
//!
//! Event types declare their dispatch-relevant ancestors explicitly in a
//! [`TypeTable`] built at startup; there is no runtime reflection. The
//! flattened closure of a concrete type (itself, then its ancestors
//! transitively, nearest first, first-seen order, deduplicated) is computed
//! once per concrete type and memoized in an append-only cache.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Declared direct ancestors per event type, in declaration order.
#[derive(Debug, Default)]
pub struct TypeTable {
    parents: HashMap<String, Vec<String>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the direct ancestors of `name`. Ancestors may themselves be
    /// described; the closure walk follows the table transitively. Types
    /// never described are treated as having no ancestors.
    pub fn describe(&mut self, name: &str, parents: &[&str]) {
        self.parents.insert(
            name.to_string(),
            parents.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub fn direct_parents(&self, name: &str) -> &[String] {
        self.parents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Memoized mapping from a concrete type to its ordered ancestor closure.
///
/// Shared process-wide and append-only: concurrent readers need no
/// coordination, and a race to populate the same key is harmless since both
/// writers compute the same deterministic value. The computation counter is
/// a test hook for observing cache hits.
#[derive(Debug, Default)]
pub struct HierarchyCache {
    closures: RwLock<HashMap<String, Arc<[String]>>>,
    computations: AtomicU64,
}

impl HierarchyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the flattened closure of `concrete`, computing and caching it
    /// on first sight.
    pub fn flatten(&self, concrete: &str, table: &TypeTable) -> Arc<[String]> {
        if let Some(hit) = self.closures.read().get(concrete) {
            return hit.clone();
        }

        self.computations.fetch_add(1, Ordering::Relaxed);
        let closure = Self::compute(concrete, table);

        let mut closures = self.closures.write();
        closures
            .entry(concrete.to_string())
            .or_insert_with(|| Arc::from(closure))
            .clone()
    }

    /// How many closures have been computed (as opposed to served from
    /// cache).
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    // Breadth-first over the declared ancestry: the concrete type first,
    // then direct ancestors in declaration order, then theirs. A type
    // reachable through multiple paths keeps its first-seen position.
    fn compute(concrete: &str, table: &TypeTable) -> Vec<String> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(concrete.to_string());

        while let Some(type_name) = frontier.pop_front() {
            if !seen.insert(type_name.clone()) {
                continue;
            }
            for parent in table.direct_parents(&type_name) {
                frontier.push_back(parent.clone());
            }
            ordered.push(type_name);
        }

        ordered
    }
}
