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

//! Top-level `Engine`: wires C1-C5 together behind the exposed contract
//! (`Init`/`Reload`/`Lookup`/`Resolve`/`Cost`/override CRUD/listing).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::cost::{CostCalculator, UsageResponse};
use crate::error::Result;
use crate::model::{PricingEntry, RequestMode};
use crate::overrides::{Override, OverrideEngine};
use crate::repository::{NullRepository, Repository};
use crate::resolver::Resolver;
use crate::store::PricingStore;
use crate::sync::SyncWorker;

pub struct Engine {
    store: Arc<PricingStore>,
    overrides: Arc<OverrideEngine>,
    resolver: Arc<Resolver>,
    cost_calculator: CostCalculator,
    sync_worker: Arc<SyncWorker>,
    repository: Arc<dyn Repository>,
}

impl Engine {
    /// `Init(ctx, config, repo, logger) -> (engine, err)`. `repo` defaults
    /// to `NullRepository` (datasheet-only boot) when the caller has none.
    pub async fn init(config: EngineConfig, repository: Option<Arc<dyn Repository>>) -> Result<Arc<Self>> {
        let repository_configured = repository.is_some();
        let repository = repository.unwrap_or_else(|| Arc::new(NullRepository));
        let store = Arc::new(PricingStore::new());
        let overrides = Arc::new(OverrideEngine::new());

        let persisted_overrides = repository
            .get_pricing_overrides(Default::default())
            .await
            .unwrap_or_default();
        if !persisted_overrides.is_empty() {
            overrides.set_all(persisted_overrides)?;
        }

        let resolver = Arc::new(Resolver::new(store.clone(), overrides.clone()));
        let cost_calculator = CostCalculator::new(resolver.clone());

        let sync_worker = Arc::new(SyncWorker::new(
            store.clone(),
            repository.clone(),
            repository_configured,
            config,
        ));
        sync_worker.boot().await?;
        sync_worker.spawn();

        Ok(Arc::new(Self {
            store,
            overrides,
            resolver,
            cost_calculator,
            sync_worker,
            repository,
        }))
    }

    /// `Reload(ctx, config) -> err`: stops the current worker and restarts
    /// it around the new config with an immediate sync.
    pub async fn reload(&self, config: EngineConfig) -> Result<()> {
        self.sync_worker.reload(config).await
    }

    /// `Cleanup`: stop the background worker. Idempotent.
    pub async fn cleanup(&self) {
        self.sync_worker.cleanup().await;
    }

    pub fn lookup(&self, model: &str, provider: &str, mode: RequestMode) -> Option<PricingEntry> {
        self.store.lookup(model, provider, mode)
    }

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
        self.resolver
            .resolve(provider, key_id, vk_id, model, deployment_alias, mode)
    }

    pub fn cost(&self, response: Option<&UsageResponse>) -> f64 {
        self.cost_calculator.cost(response)
    }

    pub fn set_overrides(&self, overrides: Vec<Override>) -> Result<()> {
        self.overrides.set_all(overrides)
    }

    pub fn upsert_override(&self, ov: Override) -> Result<()> {
        self.overrides.upsert(ov)
    }

    pub fn delete_override(&self, id: &str) {
        self.overrides.delete(id)
    }

    pub fn snapshot_overrides(&self) -> Arc<Vec<Override>> {
        self.overrides.snapshot()
    }

    /// Derived model-pool listing: every model known for `provider`.
    pub fn models_for_provider(&self, provider: &str) -> BTreeSet<String> {
        let normalized = crate::model::normalize_provider(provider);
        self.store
            .snapshot()
            .keys()
            .filter(|k| k.provider == normalized)
            .map(|k| k.model.clone())
            .collect()
    }

    /// Derived model-pool listing: every provider that serves `model`.
    pub fn providers_for_model(&self, model: &str) -> BTreeSet<String> {
        self.store
            .snapshot()
            .keys()
            .filter(|k| k.model == model)
            .map(|k| k.provider.clone())
            .collect()
    }

    /// Full provider -> set<model> pool, rebuilt from the current C1
    /// snapshot (spec §4.5 boot step 3 / §5(d)).
    pub fn model_pool(&self) -> HashMap<String, BTreeSet<String>> {
        let mut pool: HashMap<String, BTreeSet<String>> = HashMap::new();
        for key in self.store.snapshot().keys() {
            pool.entry(key.provider.clone()).or_default().insert(key.model.clone());
        }
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as EngineResult;
    use crate::overrides::Override;
    use crate::repository::OverrideFilter;
    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    /// A repository that already holds pricing rows. Used instead of
    /// `NullRepository` in these tests so `Engine::init`'s boot path takes
    /// the "load from repository" branch and its best-effort immediate
    /// sync (which would otherwise hit the real network) fails silently.
    #[derive(Default)]
    struct SeededRepository {
        entries: Vec<PricingEntry>,
        config: AsyncMutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl Repository for SeededRepository {
        async fn get_model_prices(&self) -> EngineResult<Vec<PricingEntry>> {
            Ok(self.entries.clone())
        }

        async fn replace_model_prices(&self, _entries: Vec<PricingEntry>) -> EngineResult<()> {
            Ok(())
        }

        async fn get_config(&self, key: &str) -> EngineResult<Option<String>> {
            Ok(self.config.lock().await.get(key).cloned())
        }

        async fn update_config(&self, key: &str, value: &str) -> EngineResult<()> {
            self.config.lock().await.insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_pricing_overrides(&self, _filter: OverrideFilter) -> EngineResult<Vec<Override>> {
            Ok(Vec::new())
        }
    }

    fn seeded_repo() -> Arc<dyn Repository> {
        Arc::new(SeededRepository {
            entries: vec![PricingEntry::new("gpt-4o", "openai", RequestMode::Chat)],
            config: AsyncMutex::new(HashMap::new()),
        })
    }

    #[tokio::test]
    async fn init_loads_pricing_from_repository_and_is_queryable() {
        let engine = Engine::init(EngineConfig::default(), Some(seeded_repo())).await.unwrap();
        assert!(engine.lookup("gpt-4o", "openai", RequestMode::Chat).is_some());
        engine.cleanup().await;
    }

    #[tokio::test]
    async fn model_pool_reflects_store_contents() {
        let engine = Engine::init(EngineConfig::default(), Some(seeded_repo())).await.unwrap();
        let pool = engine.model_pool();
        assert_eq!(pool.get("openai").unwrap().len(), 1);
        engine.cleanup().await;
    }
}
