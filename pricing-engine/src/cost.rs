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

//! C4: Cost Calculator — fans a response out across six modalities
//! (plus the cache-debug short-circuit) and prices it with the pricing
//! the Resolver hands back.

use std::sync::Arc;

use crate::model::{PricingEntry, RequestMode};
use crate::resolver::Resolver;

/// Text-prompt token detail for multimodal (image-bearing) input.
#[derive(Debug, Clone, Default)]
pub struct InputTokensDetails {
    pub text_tokens: Option<u64>,
    pub image_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// 0 means "derive from prompt + completion".
    pub total_tokens: u64,

    /// Prompt tokens served from cache, billed at `cache_read_input_token_cost`
    /// instead of the base input rate (or not billed at all if that rate is
    /// absent).
    pub cached_prompt_tokens: Option<u64>,
    /// Completion-side cache-creation tokens, billed at
    /// `cache_creation_input_token_cost` instead of the base output rate.
    pub cache_creation_tokens: Option<u64>,

    pub num_search_queries: Option<u64>,

    pub audio_seconds: Option<f64>,
    pub audio_tokens: Option<u64>,
    pub text_tokens: Option<u64>,

    pub input_tokens_details: Option<InputTokensDetails>,
    pub output_image_count: Option<u64>,
    pub input_image_count: Option<u64>,

    pub output_seconds: Option<f64>,

    pub is_batch: bool,
    pub is_cache_read: bool,
}

impl Usage {
    fn total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

#[derive(Debug, Clone)]
pub enum CacheDebugKind {
    DirectHit,
    SemanticHit,
    Miss,
}

#[derive(Debug, Clone)]
pub struct EmbeddingProvenance {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct CacheDebug {
    pub kind: CacheDebugKind,
    pub embedding_provenance: Option<EmbeddingProvenance>,
}

/// Input to `CostCalculator::cost`. Left abstract by spec §4.4/§9 as
/// "transport-specific"; this is this crate's concrete shape.
#[derive(Debug, Clone)]
pub struct UsageResponse {
    pub provider: String,
    pub model: String,
    pub request_type: RequestMode,
    pub usage: Usage,
    pub key_id: Option<String>,
    pub vk_id: Option<String>,
    pub deployment_alias: Option<String>,
    /// A cost the upstream provider already computed and billed; when set
    /// it passes through verbatim and nothing below is consulted.
    pub precomputed_cost: Option<f64>,
    pub cache_debug: Option<CacheDebug>,
}

pub struct CostCalculator {
    resolver: Arc<Resolver>,
}

impl CostCalculator {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    /// `Cost(response) -> float64`. Never errors: a missing response, a
    /// pricing miss, or incomplete usage all settle to `0.0`.
    pub fn cost(&self, response: Option<&UsageResponse>) -> f64 {
        let Some(response) = response else {
            return 0.0;
        };
        if let Some(precomputed) = response.precomputed_cost {
            return precomputed;
        }

        if let Some(cache_debug) = &response.cache_debug {
            return match cache_debug.kind {
                CacheDebugKind::DirectHit => 0.0,
                CacheDebugKind::SemanticHit => cache_debug
                    .embedding_provenance
                    .as_ref()
                    .map(|p| self.embedding_provenance_cost(p))
                    .unwrap_or(0.0),
                CacheDebugKind::Miss => {
                    let embedding = cache_debug
                        .embedding_provenance
                        .as_ref()
                        .map(|p| self.embedding_provenance_cost(p))
                        .unwrap_or(0.0);
                    self.base_cost(response) + embedding
                }
            };
        }

        self.base_cost(response)
    }

    fn embedding_provenance_cost(&self, p: &EmbeddingProvenance) -> f64 {
        match self
            .resolver
            .resolve(&p.provider, None, None, &p.model, None, RequestMode::Embedding)
        {
            Some(entry) => p.input_tokens as f64 * entry.input_cost_per_token,
            None => 0.0,
        }
    }

    fn base_cost(&self, response: &UsageResponse) -> f64 {
        let Some(entry) = self.resolver.resolve(
            &response.provider,
            response.key_id.as_deref(),
            response.vk_id.as_deref(),
            &response.model,
            response.deployment_alias.as_deref(),
            response.request_type,
        ) else {
            return 0.0;
        };

        match response.request_type {
            RequestMode::Chat | RequestMode::Completion | RequestMode::Responses => {
                self.text_cost(&entry, &response.usage)
            }
            RequestMode::Embedding => self.embedding_cost(&entry, &response.usage),
            RequestMode::Rerank => self.rerank_cost(&entry, &response.usage),
            RequestMode::AudioSpeech => self.speech_cost(&entry, &response.usage),
            RequestMode::AudioTranscription => self.transcription_cost(&entry, &response.usage),
            RequestMode::ImageGeneration => self.image_cost(&entry, &response.usage),
            RequestMode::VideoGeneration => self.video_cost(&entry, &response.usage),
            RequestMode::Unknown => 0.0,
        }
    }

    fn text_cost(&self, entry: &PricingEntry, usage: &Usage) -> f64 {
        let p = usage.prompt_tokens;
        let c = usage.completion_tokens;

        if usage.is_batch {
            let in_rate = entry.input_cost_per_token_batches.unwrap_or(entry.input_cost_per_token);
            let out_rate = entry.output_cost_per_token_batches.unwrap_or(entry.output_cost_per_token);
            return p as f64 * in_rate + c as f64 * out_rate;
        }
        if usage.is_cache_read {
            let in_rate = entry.cache_read_input_token_cost.unwrap_or(entry.input_cost_per_token);
            return p as f64 * in_rate + c as f64 * entry.output_cost_per_token;
        }

        let (mut in_rate, mut out_rate) = (entry.input_cost_per_token, entry.output_cost_per_token);
        if usage.total() > 200_000 {
            if let (Some(ir), Some(or)) = (
                entry.input_cost_per_token_above_200k_tokens,
                entry.output_cost_per_token_above_200k_tokens,
            ) {
                in_rate = ir;
                out_rate = or;
            }
        }

        let cached_prompt = usage.cached_prompt_tokens.unwrap_or(0).min(p);
        let billed_prompt = p - cached_prompt;
        let mut cost = billed_prompt as f64 * in_rate;
        if cached_prompt > 0 {
            if let Some(rate) = entry.cache_read_input_token_cost {
                cost += cached_prompt as f64 * rate;
            }
        }

        let cache_creation = usage.cache_creation_tokens.unwrap_or(0).min(c);
        let billed_completion = c - cache_creation;
        cost += billed_completion as f64 * out_rate;
        if cache_creation > 0 {
            if let Some(rate) = entry.cache_creation_input_token_cost {
                cost += cache_creation as f64 * rate;
            }
        }

        if let Some(queries) = usage.num_search_queries {
            if let Some(rate) = entry.search_context_cost_per_query {
                cost += queries as f64 * rate;
            }
        }

        cost
    }

    fn embedding_cost(&self, entry: &PricingEntry, usage: &Usage) -> f64 {
        usage.prompt_tokens as f64 * entry.input_cost_per_token
    }

    fn rerank_cost(&self, entry: &PricingEntry, usage: &Usage) -> f64 {
        let mut cost = usage.prompt_tokens as f64 * entry.input_cost_per_token
            + usage.completion_tokens as f64 * entry.output_cost_per_token;
        if let Some(queries) = usage.num_search_queries {
            if let Some(rate) = entry.search_context_cost_per_query {
                cost += queries as f64 * rate;
            }
        }
        cost
    }

    fn speech_cost(&self, entry: &PricingEntry, usage: &Usage) -> f64 {
        match usage.audio_seconds {
            Some(seconds) if seconds > 0.0 => {
                let rate = entry
                    .input_cost_per_second
                    .or(entry.input_cost_per_audio_per_second)
                    .unwrap_or(0.0);
                seconds * rate + usage.completion_tokens as f64 * entry.output_cost_per_token
            }
            _ => self.text_cost(entry, usage),
        }
    }

    fn transcription_cost(&self, entry: &PricingEntry, usage: &Usage) -> f64 {
        if let Some(seconds) = usage.audio_seconds {
            if seconds > 0.0 {
                return self.speech_cost(entry, usage);
            }
        }

        if let Some(audio_tokens) = usage.audio_tokens {
            let text_tokens = usage.text_tokens.unwrap_or(0);
            let (mut in_rate, out_rate) = (entry.input_cost_per_token, entry.output_cost_per_token);
            if usage.total() > 128_000 {
                if let Some(tiered) = entry.input_cost_per_token_above_128k_tokens {
                    in_rate = tiered;
                }
            }
            return (audio_tokens + text_tokens) as f64 * in_rate
                + usage.completion_tokens as f64 * out_rate;
        }

        self.text_cost(entry, usage)
    }

    fn image_cost(&self, entry: &PricingEntry, usage: &Usage) -> f64 {
        if let Some(output_per_image) = entry.output_cost_per_image {
            let n_images = usage.output_image_count.unwrap_or(1);
            let mut cost = n_images as f64 * output_per_image;
            if let (Some(input_per_image), Some(n_input)) =
                (entry.input_cost_per_image, usage.input_image_count)
            {
                cost += n_input as f64 * input_per_image;
            }
            return cost;
        }

        let input_tokens = usage
            .input_tokens_details
            .as_ref()
            .map(|d| d.text_tokens.unwrap_or(0) + d.image_tokens.unwrap_or(0))
            .unwrap_or(usage.prompt_tokens);

        input_tokens as f64 * entry.input_cost_per_token
            + usage.completion_tokens as f64 * entry.output_cost_per_token
    }

    fn video_cost(&self, entry: &PricingEntry, usage: &Usage) -> f64 {
        let rate = entry
            .output_cost_per_video_per_second
            .or(entry.output_cost_per_second)
            .unwrap_or(0.0);
        usage.output_seconds.unwrap_or(0.0) * rate
            + usage.prompt_tokens as f64 * entry.input_cost_per_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::OverrideEngine;
    use crate::store::PricingStore;

    fn entry(model: &str, provider: &str, mode: RequestMode) -> PricingEntry {
        PricingEntry::new(model, provider, mode)
    }

    fn calculator_with(entries: Vec<PricingEntry>) -> CostCalculator {
        let store = Arc::new(PricingStore::new());
        store.replace(entries);
        let overrides = Arc::new(OverrideEngine::new());
        CostCalculator::new(Arc::new(Resolver::new(store, overrides)))
    }

    fn response(provider: &str, model: &str, mode: RequestMode, usage: Usage) -> UsageResponse {
        UsageResponse {
            provider: provider.to_string(),
            model: model.to_string(),
            request_type: mode,
            usage,
            key_id: None,
            vk_id: None,
            deployment_alias: None,
            precomputed_cost: None,
            cache_debug: None,
        }
    }

    #[test]
    fn nil_response_is_zero() {
        let calc = calculator_with(vec![]);
        assert_eq!(calc.cost(None), 0.0);
    }

    #[test]
    fn missing_pricing_is_zero() {
        let calc = calculator_with(vec![]);
        let r = response("openai", "gpt-4o", RequestMode::Chat, Usage::default());
        assert_eq!(calc.cost(Some(&r)), 0.0);
    }

    #[test]
    fn precomputed_cost_passes_through() {
        let calc = calculator_with(vec![]);
        let mut r = response("openai", "gpt-4o", RequestMode::Chat, Usage::default());
        r.precomputed_cost = Some(1.23);
        assert_eq!(calc.cost(Some(&r)), 1.23);
    }

    #[test]
    fn chat_cost_with_cached_prompt_tokens_scenario_5() {
        let mut e = entry("claude-3-5-sonnet", "anthropic", RequestMode::Chat);
        e.input_cost_per_token = 3e-6;
        e.output_cost_per_token = 15e-6;
        e.cache_read_input_token_cost = Some(3e-7);
        e.cache_creation_input_token_cost = Some(3.75e-6);
        let calc = calculator_with(vec![e]);

        let usage = Usage {
            prompt_tokens: 5000,
            completion_tokens: 1000,
            cached_prompt_tokens: Some(3000),
            cache_creation_tokens: Some(500),
            ..Default::default()
        };
        let r = response("anthropic", "claude-3-5-sonnet", RequestMode::Chat, usage);
        let cost = calc.cost(Some(&r));
        assert!((cost - 0.016275).abs() < 1e-12, "got {cost}");
    }

    #[test]
    fn semantic_cache_miss_bills_embedding_too_scenario_6() {
        let mut chat = entry("gpt-4o", "openai", RequestMode::Chat);
        chat.input_cost_per_token = 5e-6;
        chat.output_cost_per_token = 15e-6;
        let mut embed = entry("text-embedding-3-small", "openai", RequestMode::Embedding);
        embed.input_cost_per_token = 2e-8;
        let calc = calculator_with(vec![chat, embed]);

        let usage = Usage {
            prompt_tokens: 1000,
            completion_tokens: 500,
            total_tokens: 1500,
            ..Default::default()
        };
        let mut r = response("openai", "gpt-4o", RequestMode::Chat, usage);
        r.cache_debug = Some(CacheDebug {
            kind: CacheDebugKind::Miss,
            embedding_provenance: Some(EmbeddingProvenance {
                provider: "openai".to_string(),
                model: "text-embedding-3-small".to_string(),
                input_tokens: 500,
            }),
        });
        let cost = calc.cost(Some(&r));
        assert!((cost - 0.01251).abs() < 1e-12, "got {cost}");
    }

    #[test]
    fn direct_cache_hit_is_free() {
        let mut e = entry("gpt-4o", "openai", RequestMode::Chat);
        e.input_cost_per_token = 5e-6;
        e.output_cost_per_token = 15e-6;
        let calc = calculator_with(vec![e]);
        let mut r = response(
            "openai",
            "gpt-4o",
            RequestMode::Chat,
            Usage {
                prompt_tokens: 1000,
                completion_tokens: 500,
                ..Default::default()
            },
        );
        r.cache_debug = Some(CacheDebug {
            kind: CacheDebugKind::DirectHit,
            embedding_provenance: None,
        });
        assert_eq!(calc.cost(Some(&r)), 0.0);
    }

    #[test]
    fn cache_hit_without_provenance_never_overbills() {
        let mut e = entry("gpt-4o", "openai", RequestMode::Chat);
        e.input_cost_per_token = 5e-6;
        e.output_cost_per_token = 15e-6;
        let calc = calculator_with(vec![e]);
        let mut r = response(
            "openai",
            "gpt-4o",
            RequestMode::Chat,
            Usage {
                prompt_tokens: 1000,
                completion_tokens: 500,
                ..Default::default()
            },
        );
        r.cache_debug = Some(CacheDebug {
            kind: CacheDebugKind::SemanticHit,
            embedding_provenance: None,
        });
        assert_eq!(calc.cost(Some(&r)), 0.0);
    }

    #[test]
    fn embedding_cost_is_prompt_tokens_times_input_rate() {
        let mut e = entry("text-embedding-3-small", "openai", RequestMode::Embedding);
        e.input_cost_per_token = 2e-8;
        let calc = calculator_with(vec![e]);
        let r = response(
            "openai",
            "text-embedding-3-small",
            RequestMode::Embedding,
            Usage {
                prompt_tokens: 10_000,
                ..Default::default()
            },
        );
        assert!((calc.cost(Some(&r)) - 0.0002).abs() < 1e-12);
    }

    #[test]
    fn image_cost_per_image_defaults_to_one_image() {
        let mut e = entry("dall-e-3", "openai", RequestMode::ImageGeneration);
        e.output_cost_per_image = Some(0.04);
        let calc = calculator_with(vec![e]);
        let r = response(
            "openai",
            "dall-e-3",
            RequestMode::ImageGeneration,
            Usage::default(),
        );
        assert!((calc.cost(Some(&r)) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn video_cost_uses_fallback_per_second_rate() {
        let mut e = entry("veo-2", "vertex", RequestMode::VideoGeneration);
        e.output_cost_per_second = Some(0.5);
        e.input_cost_per_token = 1e-6;
        let calc = calculator_with(vec![e]);
        let r = response(
            "vertex",
            "veo-2",
            RequestMode::VideoGeneration,
            Usage {
                prompt_tokens: 100,
                output_seconds: Some(4.0),
                ..Default::default()
            },
        );
        assert!((calc.cost(Some(&r)) - (4.0 * 0.5 + 100.0 * 1e-6)).abs() < 1e-12);
    }

    #[test]
    fn batch_usage_substitutes_batch_rates() {
        let mut e = entry("gpt-4o", "openai", RequestMode::Chat);
        e.input_cost_per_token = 5e-6;
        e.output_cost_per_token = 15e-6;
        e.input_cost_per_token_batches = Some(2.5e-6);
        e.output_cost_per_token_batches = Some(7.5e-6);
        let calc = calculator_with(vec![e]);
        let r = response(
            "openai",
            "gpt-4o",
            RequestMode::Chat,
            Usage {
                prompt_tokens: 1000,
                completion_tokens: 1000,
                is_batch: true,
                ..Default::default()
            },
        );
        assert!((calc.cost(Some(&r)) - (1000.0 * 2.5e-6 + 1000.0 * 7.5e-6)).abs() < 1e-12);
    }
}
