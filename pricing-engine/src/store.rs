// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! C1: Pricing Store.
//!
//! An in-memory `(model, provider, mode) -> PricingEntry` map, rebuilt
//! wholesale on sync. Reads snapshot an `Arc` under a short read lock and
//! never block the writer; the writer builds the new map off-lock and
//! swaps the `Arc` under a short write lock (the same publication
//! discipline `ModelPricingRegistry` in the teacher crate uses one layer
//! up, pushed down to lock-free-on-read).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{normalize_provider, PricingEntry, PricingKey, RequestMode};

#[derive(Default)]
pub struct PricingStore {
    inner: RwLock<Arc<HashMap<PricingKey, PricingEntry>>>,
}

impl PricingStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Direct lookup only — no fallback chain. See `lookup_with_fallback`
    /// for the chain the resolver and public API actually use.
    pub fn lookup_direct(&self, model: &str, provider: &str, mode: RequestMode) -> Option<PricingEntry> {
        let key = PricingKey::new(model, provider, mode);
        self.inner.read().get(&key).cloned()
    }

    /// `Lookup(model, provider, mode) -> (entry, found)` with the
    /// deterministic alternate-lookup chain from spec §4.1.
    pub fn lookup(&self, model: &str, provider: &str, mode: RequestMode) -> Option<PricingEntry> {
        let provider = normalize_provider(provider);

        if let Some(entry) = self.lookup_direct(model, &provider, mode) {
            return Some(entry);
        }

        // 1. gemini -> vertex, same mode; then responses -> chat on vertex.
        if provider == "gemini" {
            if let Some(entry) = self.lookup_direct(model, "vertex", mode) {
                return Some(entry);
            }
            if matches!(mode, RequestMode::Responses) {
                if let Some(entry) = self.lookup_direct(model, "vertex", RequestMode::Chat) {
                    return Some(entry);
                }
            }
        }

        // 2. vertex + "publisher/model" -> strip prefix, retry vertex, then
        //    same-mode-collapse (responses -> chat) on the stripped model.
        if provider == "vertex" {
            if let Some((_, stripped)) = model.split_once('/') {
                if let Some(entry) = self.lookup_direct(stripped, "vertex", mode) {
                    return Some(entry);
                }
                if matches!(mode, RequestMode::Responses) {
                    if let Some(entry) = self.lookup_direct(stripped, "vertex", RequestMode::Chat) {
                        return Some(entry);
                    }
                }
            }
        }

        // 3. responses -> chat on the original provider.
        if matches!(mode, RequestMode::Responses) {
            if let Some(entry) = self.lookup_direct(model, &provider, RequestMode::Chat) {
                return Some(entry);
            }
        }

        None
    }

    /// Same as `lookup`, but retries once with `deployment_alias` as the
    /// model if the chain above misses. Only the resolver calls this path;
    /// bare `Lookup` never applies the deployment fallback.
    pub fn lookup_with_deployment_fallback(
        &self,
        model: &str,
        provider: &str,
        mode: RequestMode,
        deployment_alias: Option<&str>,
    ) -> Option<PricingEntry> {
        if let Some(entry) = self.lookup(model, provider, mode) {
            return Some(entry);
        }
        match deployment_alias {
            Some(alias) if !alias.is_empty() => self.lookup(alias, provider, mode),
            _ => None,
        }
    }

    /// Sole writer: replaces the whole map. Entries are deduplicated by
    /// (model, provider, mode), last one wins.
    pub fn replace(&self, entries: Vec<PricingEntry>) {
        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            map.insert(entry.key(), entry);
        }
        *self.inner.write() = Arc::new(map);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot grouped by provider -> set of models, for `ModelsForProvider`
    /// / `ProvidersForModel`.
    pub fn snapshot(&self) -> Arc<HashMap<PricingKey, PricingEntry>> {
        self.inner.read().clone()
    }
}
