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

//! C3: Resolver — wires the pricing store's fallback chain to the
//! override index's scope precedence to produce effective pricing.

use std::sync::Arc;

use crate::model::{normalize_provider, PricingEntry, RequestMode};
use crate::overrides::OverrideEngine;
use crate::store::PricingStore;

pub struct Resolver {
    store: Arc<PricingStore>,
    overrides: Arc<OverrideEngine>,
}

impl Resolver {
    pub fn new(store: Arc<PricingStore>, overrides: Arc<OverrideEngine>) -> Self {
        Self { store, overrides }
    }

    /// `Resolve(provider, keyId, vkId, model, deploymentAlias, requestType) -> PricingEntry | None`.
    ///
    /// `model` is the tenant-facing model name used for both the C1 lookup
    /// and C2 override matching; `deployment_alias` only ever widens the C1
    /// lookup, never the override match.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        &self,
        provider: &str,
        key_id: Option<&str>,
        vk_id: Option<&str>,
        model: &str,
        deployment_alias: Option<&str>,
        mode: RequestMode,
    ) -> Option<PricingEntry> {
        let provider_norm = normalize_provider(provider);
        let base = self
            .store
            .lookup_with_deployment_fallback(model, &provider_norm, mode, deployment_alias)?;

        let compiled = self.overrides.compiled();
        match compiled.best_match(&provider_norm, key_id, vk_id, model, mode) {
            Some(ov) => Some(ov.patch.apply(&base)),
            None => Some(base),
        }
    }
}
