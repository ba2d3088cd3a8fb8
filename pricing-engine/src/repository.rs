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

//! Abstract repository contract (§6). No concrete implementation ships in
//! this crate: callers own the database/schema and supply an adapter.
//!
//! `ExecuteTransaction`, `DeleteModelPrices`, and `CreateModelPrice` from
//! spec §6 collapse into a single `replace_model_prices` call here — Rust
//! has no ambient-transaction idiom to mirror a callback-based
//! `ExecuteTransaction(fn)`, so the contract asks the implementor to make
//! the delete-then-insert atomic internally (documented in DESIGN.md).

use async_trait::async_trait;

use crate::error::Result;
use crate::model::PricingEntry;
use crate::overrides::{Override, ScopeKind};

#[derive(Debug, Clone, Default)]
pub struct OverrideFilter {
    pub scope: Option<ScopeKind>,
    pub scope_id: Option<String>,
    pub enabled_only: bool,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_model_prices(&self) -> Result<Vec<PricingEntry>>;

    /// Deletes all pricing rows and inserts `entries`, deduplicated by
    /// (model, provider, mode), as one atomic operation.
    async fn replace_model_prices(&self, entries: Vec<PricingEntry>) -> Result<()>;

    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    async fn update_config(&self, key: &str, value: &str) -> Result<()>;

    async fn get_pricing_overrides(&self, filter: OverrideFilter) -> Result<Vec<Override>>;
}

/// A repository that holds nothing and persists nothing. Used as the
/// explicit "no repository configured" stand-in for tests and for boot
/// paths that go datasheet-only.
#[derive(Debug, Default)]
pub struct NullRepository;

#[async_trait]
impl Repository for NullRepository {
    async fn get_model_prices(&self) -> Result<Vec<PricingEntry>> {
        Ok(Vec::new())
    }

    async fn replace_model_prices(&self, _entries: Vec<PricingEntry>) -> Result<()> {
        Ok(())
    }

    async fn get_config(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn update_config(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn get_pricing_overrides(&self, _filter: OverrideFilter) -> Result<Vec<Override>> {
        Ok(Vec::new())
    }
}
