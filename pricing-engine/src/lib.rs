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

//! Pricing Engine
//!
//! Model catalog and pricing resolution for an LLM gateway: a pricing
//! store with provider/mode fallback (C1), a scope-precedence override
//! index (C2), a resolver that merges the two (C3), a cost calculator
//! covering the supported response modalities (C4), and a background
//! worker that keeps the catalog in sync with an upstream datasheet (C5).

pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod model;
pub mod overrides;
pub mod repository;
pub mod resolver;
pub mod store;
pub mod sync;

pub use config::EngineConfig;
pub use cost::{CacheDebug, CacheDebugKind, CostCalculator, EmbeddingProvenance, InputTokensDetails, Usage, UsageResponse};
pub use engine::Engine;
pub use error::{PricingEngineError, Result};
pub use model::{normalize_provider, PricingEntry, PricingKey, RequestMode};
pub use overrides::{CompiledIndex, MatchKind, Override, OverrideEngine, PricingPatch, ScopeKind};
pub use repository::{NullRepository, OverrideFilter, Repository};
pub use resolver::Resolver;
pub use store::PricingStore;
pub use sync::{DatasheetClient, SyncWorker};
