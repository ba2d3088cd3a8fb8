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

//! C5: Sync Worker — keeps C1 fresh from the upstream datasheet, with the
//! repository (when configured) as the durable source of truth.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{PricingEngineError, Result};
use crate::model::{PricingEntry, RequestMode};
use crate::repository::Repository;
use crate::store::PricingStore;

const LAST_SYNC_CONFIG_KEY: &str = "pricing_engine.last_sync_at";

/// HTTPS client for the datasheet URL, grounded on
/// `ModelPricingRegistry::sync_from_upstream`'s client construction: a
/// single `reqwest::Client` built with a 30s timeout, one GET, a status
/// check, then `.json()`.
pub struct DatasheetClient {
    client: reqwest::Client,
}

impl Default for DatasheetClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasheetClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self { client }
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<PricingEntry>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PricingEngineError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PricingEngineError::Fetch(format!(
                "datasheet returned HTTP {}",
                response.status()
            )));
        }

        let raw: HashMap<String, Value> = response
            .json()
            .await
            .map_err(|e| PricingEngineError::Fetch(e.to_string()))?;

        Ok(parse_datasheet(raw))
    }
}

/// Parses the LiteLLM-shaped `{ "<provider>/<model>" | "<model>": {...} }`
/// map into entries, field-by-field, mirroring
/// `ModelPricingRegistry::parse_litellm_model`'s `obj.get(...).and_then(...)`
/// style rather than a strict `Deserialize` derive — upstream entries carry
/// fields this crate doesn't model (context windows, modalities) that must
/// be ignored rather than rejected.
fn parse_datasheet(raw: HashMap<String, Value>) -> Vec<PricingEntry> {
    let mut entries = Vec::with_capacity(raw.len());
    for (key, value) in raw {
        if key == "sample_spec" || key.starts_with('_') {
            continue;
        }
        let Some(obj) = value.as_object() else {
            continue;
        };

        let (key_provider, key_model) = match key.split_once('/') {
            Some((p, m)) => (Some(p.to_string()), m.to_string()),
            None => (None, key.clone()),
        };

        let provider = obj
            .get("litellm_provider")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or(key_provider)
            .unwrap_or_else(|| "unknown".to_string());

        let mode = obj
            .get("mode")
            .and_then(|v| v.as_str())
            .map(RequestMode::parse)
            .unwrap_or(RequestMode::Chat);

        let mut entry = PricingEntry::new(key_model, provider, mode);
        entry.input_cost_per_token = f64_field(obj, "input_cost_per_token").unwrap_or(0.0);
        entry.output_cost_per_token = f64_field(obj, "output_cost_per_token").unwrap_or(0.0);
        entry.input_cost_per_token_above_128k_tokens =
            f64_field(obj, "input_cost_per_token_above_128k_tokens");
        entry.output_cost_per_token_above_128k_tokens =
            f64_field(obj, "output_cost_per_token_above_128k_tokens");
        entry.input_cost_per_token_above_200k_tokens =
            f64_field(obj, "input_cost_per_token_above_200k_tokens");
        entry.output_cost_per_token_above_200k_tokens =
            f64_field(obj, "output_cost_per_token_above_200k_tokens");
        entry.cache_read_input_token_cost = f64_field(obj, "cache_read_input_token_cost");
        entry.cache_creation_input_token_cost = f64_field(obj, "cache_creation_input_token_cost");
        entry.cache_creation_input_token_cost_above_1hr =
            f64_field(obj, "cache_creation_input_token_cost_above_1hr");
        entry.cache_read_input_token_cost_audio = f64_field(obj, "cache_read_input_token_cost_audio");
        entry.input_cost_per_token_batches = f64_field(obj, "input_cost_per_token_batches");
        entry.output_cost_per_token_batches = f64_field(obj, "output_cost_per_token_batches");
        entry.input_cost_per_token_priority = f64_field(obj, "input_cost_per_token_priority");
        entry.output_cost_per_token_priority = f64_field(obj, "output_cost_per_token_priority");
        entry.input_cost_per_character = f64_field(obj, "input_cost_per_character");
        entry.input_cost_per_image = f64_field(obj, "input_cost_per_image");
        entry.output_cost_per_image = f64_field(obj, "output_cost_per_image");
        entry.output_cost_per_pixel = f64_field(obj, "output_cost_per_pixel");
        entry.output_cost_per_image_above_tier = f64_field(obj, "output_cost_per_image_above_tier");
        entry.input_cost_per_audio_token = f64_field(obj, "input_cost_per_audio_token");
        entry.output_cost_per_audio_token = f64_field(obj, "output_cost_per_audio_token");
        entry.input_cost_per_audio_per_second = f64_field(obj, "input_cost_per_audio_per_second");
        entry.input_cost_per_second = f64_field(obj, "input_cost_per_second");
        entry.output_cost_per_video_per_second = f64_field(obj, "output_cost_per_video_per_second");
        entry.output_cost_per_second = f64_field(obj, "output_cost_per_second");
        entry.input_cost_per_image_token = f64_field(obj, "input_cost_per_image_token");
        entry.output_cost_per_image_token = f64_field(obj, "output_cost_per_image_token");
        entry.search_context_cost_per_query = f64_field(obj, "search_context_cost_per_query");
        entry.code_interpreter_cost_per_session = f64_field(obj, "code_interpreter_cost_per_session");

        entries.push(entry);
    }
    entries
}

fn f64_field(obj: &serde_json::Map<String, Value>, name: &str) -> Option<f64> {
    obj.get(name).and_then(|v| v.as_f64())
}

/// Drives C1's periodic refresh. One `tokio::task` per `Engine`, cancelled
/// cooperatively via `CancellationToken` — the ticker loop and the HTTP
/// request both honor it, matching spec §5's cancellation guarantee.
pub struct SyncWorker {
    store: Arc<PricingStore>,
    repository: Arc<dyn Repository>,
    /// Whether the caller supplied a real repository at `Engine::init`, as
    /// opposed to the `NullRepository` zero-config default. Boot behavior
    /// (spec §4.5) branches on this, not on whether the repository happens
    /// to be empty on first read — a freshly-provisioned, genuinely
    /// configured repository is empty on its very first boot too.
    repository_configured: bool,
    client: DatasheetClient,
    config: Arc<AsyncMutex<EngineConfig>>,
    cancel: RwLock<CancellationToken>,
    handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SyncWorker {
    pub fn new(
        store: Arc<PricingStore>,
        repository: Arc<dyn Repository>,
        repository_configured: bool,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            repository,
            repository_configured,
            client: DatasheetClient::new(),
            config: Arc::new(AsyncMutex::new(config)),
            cancel: RwLock::new(CancellationToken::new()),
            handle: AsyncMutex::new(None),
        }
    }

    /// Boot sequence (spec §4.5 "Boot"): load from the repository if one is
    /// configured, else fetch the datasheet directly. The repository branch
    /// loads whatever rows exist (zero or more) and then attempts an
    /// immediate best-effort sync regardless, since a configured-but-empty
    /// repository still needs its first sync to persist anything.
    pub async fn boot(&self) -> Result<()> {
        if self.repository_configured {
            let from_repo = self.repository.get_model_prices().await.unwrap_or_default();
            if !from_repo.is_empty() {
                self.store.replace(from_repo);
            }
            if let Err(e) = self.sync_once().await {
                tracing::warn!(error = %e, "initial best-effort sync failed, keeping repository-loaded pricing");
            }
        } else {
            let url = self.config.lock().await.pricing_url.clone();
            let entries = self.client.fetch(&url).await?;
            self.store.replace(entries);
        }
        Ok(())
    }

    async fn repository_has_prior_records(&self) -> bool {
        matches!(self.repository.get_model_prices().await, Ok(v) if !v.is_empty())
    }

    /// Spawns the background ticker task. Returns immediately; call
    /// `cleanup` to stop it.
    pub fn spawn(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        let cancel = self.cancel.read().clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(crate::config::TICKER_CADENCE);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = worker.check_and_sync().await {
                            tracing::error!(error = %e, "scheduled sync failed");
                        }
                    }
                }
            }
        });
        // `spawn` is only ever called once per worker instance (from
        // `Engine::init`/`Engine::reload`), so a pre-existing handle here
        // would indicate a bug upstream; best-effort replace is fine.
        if let Ok(mut guard) = self.handle.try_lock() {
            *guard = Some(task);
        }
    }

    /// `checkAndSync`: consults the persisted `last_sync_at` marker and
    /// triggers a full sync if it's missing, unparsable, or stale.
    pub async fn check_and_sync(&self) -> Result<()> {
        let interval = self.config.lock().await.effective_sync_interval();
        let last_sync_at = self
            .repository
            .get_config(LAST_SYNC_CONFIG_KEY)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));

        let due = match last_sync_at {
            Some(ts) => Utc::now().signed_duration_since(ts).to_std().unwrap_or(interval) >= interval,
            None => true,
        };

        if due {
            self.sync_once().await
        } else {
            Ok(())
        }
    }

    /// Full sync procedure (spec §4.5 "Sync procedure"): fetch, replace the
    /// repository's pricing rows atomically, persist `last_sync_at`, then
    /// reload C1 from the repository (the source of truth once one exists).
    pub async fn sync_once(&self) -> Result<()> {
        let url = self.config.lock().await.pricing_url.clone();
        let fetched = match self.client.fetch(&url).await {
            Ok(entries) => entries,
            Err(e) => {
                if self.repository_has_prior_records().await {
                    tracing::warn!(error = %e, "sync fetch failed, retaining current in-memory pricing");
                    return Ok(());
                }
                return Err(e);
            }
        };

        self.repository.replace_model_prices(fetched.clone()).await?;
        self.repository
            .update_config(LAST_SYNC_CONFIG_KEY, &Utc::now().timestamp().to_string())
            .await?;

        let reloaded = self.repository.get_model_prices().await?;
        if reloaded.is_empty() {
            self.store.replace(fetched);
        } else {
            self.store.replace(reloaded);
        }
        Ok(())
    }

    /// Cancels the existing worker, swaps config under the dedicated
    /// config lock, installs a fresh cancellation token, restarts the
    /// ticker, and triggers an immediate sync.
    pub async fn reload(self: &Arc<Self>, new_config: EngineConfig) -> Result<()> {
        self.cleanup().await;
        *self.config.lock().await = new_config;
        *self.cancel.write() = CancellationToken::new();
        self.spawn();
        self.sync_once().await
    }

    /// Cancels the worker context, stops the ticker, and joins the task.
    /// Idempotent: calling it twice (or before `spawn`) is a no-op.
    pub async fn cleanup(&self) {
        self.cancel.read().cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}
