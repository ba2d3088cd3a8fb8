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

//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Datasheet URL the sync worker falls back to when no override is given.
pub const DEFAULT_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

/// Background `checkAndSync` ticks never trigger a resync more often than
/// this, regardless of a shorter `pricing_sync_interval`.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// Fixed cadence of the background ticker itself (distinct from how often
/// a full sync actually happens, see `MIN_SYNC_INTERVAL`).
pub const TICKER_CADENCE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pricing_url: String,
    #[serde(with = "seconds")]
    pub pricing_sync_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pricing_url: DEFAULT_PRICING_URL.to_string(),
            pricing_sync_interval: Duration::from_secs(24 * 3600),
        }
    }
}

impl EngineConfig {
    /// The interval actually used for the `now - last_sync_at >= interval`
    /// comparison in `checkAndSync`: never below the enforced minimum.
    pub fn effective_sync_interval(&self) -> Duration {
        self.pricing_sync_interval.max(MIN_SYNC_INTERVAL)
    }
}

/// Plain-seconds (de)serializer: this crate has no dependency on a
/// dedicated humantime crate, unlike the teacher's `chrono`-based configs.
mod seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_24h_interval_and_system_url() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pricing_sync_interval, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.pricing_url, DEFAULT_PRICING_URL);
    }

    #[test]
    fn effective_interval_is_clamped_to_minimum() {
        let cfg = EngineConfig {
            pricing_sync_interval: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(cfg.effective_sync_interval(), MIN_SYNC_INTERVAL);
    }
}
