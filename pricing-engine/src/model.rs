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

//! Shared data model: pricing entries and the request-mode enumeration.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Canonical request modes. Streaming variants ("chat_stream",
/// "stream-chat", "chat_completion", ...) all normalize to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestMode {
    Chat,
    Completion,
    Responses,
    Embedding,
    Rerank,
    AudioSpeech,
    AudioTranscription,
    ImageGeneration,
    VideoGeneration,
    Unknown,
}

impl RequestMode {
    /// Parse and normalize a caller-supplied mode string. Unknown strings
    /// map to `Unknown` rather than failing; callers decide whether that's
    /// an error (override compilation rejects `Unknown` explicitly).
    pub fn parse(raw: &str) -> Self {
        let collapsed = collapse_stream_suffix(raw);
        match collapsed.as_ref() {
            "chat" | "chat_completion" | "chatcompletion" => RequestMode::Chat,
            "completion" | "text_completion" | "textcompletion" => RequestMode::Completion,
            "responses" | "response" => RequestMode::Responses,
            "embedding" | "embeddings" => RequestMode::Embedding,
            "rerank" | "reranking" => RequestMode::Rerank,
            "audio_speech" | "speech" | "tts" => RequestMode::AudioSpeech,
            "audio_transcription" | "transcription" | "stt" => RequestMode::AudioTranscription,
            "image_generation" | "image" => RequestMode::ImageGeneration,
            "video_generation" | "video" => RequestMode::VideoGeneration,
            _ => RequestMode::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Chat => "chat",
            RequestMode::Completion => "completion",
            RequestMode::Responses => "responses",
            RequestMode::Embedding => "embedding",
            RequestMode::Rerank => "rerank",
            RequestMode::AudioSpeech => "audio_speech",
            RequestMode::AudioTranscription => "audio_transcription",
            RequestMode::ImageGeneration => "image_generation",
            RequestMode::VideoGeneration => "video_generation",
            RequestMode::Unknown => "unknown",
        }
    }
}

/// Strips a leading `stream-` or trailing `_stream`/`-stream`, then
/// lower-cases and trims whitespace. `stream-X -> X`, `X_stream -> X`.
fn collapse_stream_suffix(raw: &str) -> Cow<'_, str> {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let stripped = lower
        .strip_prefix("stream-")
        .or_else(|| lower.strip_prefix("stream_"))
        .or_else(|| lower.strip_suffix("_stream"))
        .or_else(|| lower.strip_suffix("-stream"))
        .unwrap_or(&lower)
        .to_string();
    Cow::Owned(stripped)
}

/// Normalizes a provider name: `vertex_ai*`/`google-vertex` -> `vertex`,
/// `*bedrock*` -> `bedrock`, `*cohere*` -> `cohere`, else identity
/// (lower-cased and trimmed).
pub fn normalize_provider(raw: &str) -> String {
    let p = raw.trim().to_lowercase();
    if p.starts_with("vertex_ai") || p == "google-vertex" || p == "vertex" {
        "vertex".to_string()
    } else if p.contains("bedrock") {
        "bedrock".to_string()
    } else if p.contains("cohere") {
        "cohere".to_string()
    } else {
        p
    }
}

/// Identifies a `PricingEntry` in the store: (model, provider, mode).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PricingKey {
    pub model: String,
    pub provider: String,
    pub mode: RequestMode,
}

impl PricingKey {
    pub fn new(model: impl Into<String>, provider: impl Into<String>, mode: RequestMode) -> Self {
        Self {
            model: model.into(),
            provider: normalize_provider(&provider.into()),
            mode,
        }
    }
}

/// Immutable pricing record for one (model, provider, mode) triple.
///
/// Only `input_cost_per_token` and `output_cost_per_token` are required;
/// every other rate signals "not applicable" via `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub model: String,
    pub provider: String,
    pub mode: RequestMode,

    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,

    #[serde(default)]
    pub input_cost_per_token_above_128k_tokens: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token_above_128k_tokens: Option<f64>,
    #[serde(default)]
    pub input_cost_per_token_above_200k_tokens: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token_above_200k_tokens: Option<f64>,

    #[serde(default)]
    pub cache_read_input_token_cost: Option<f64>,
    #[serde(default)]
    pub cache_creation_input_token_cost: Option<f64>,
    #[serde(default)]
    pub cache_creation_input_token_cost_above_1hr: Option<f64>,
    #[serde(default)]
    pub cache_read_input_token_cost_audio: Option<f64>,

    #[serde(default)]
    pub input_cost_per_token_batches: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token_batches: Option<f64>,

    #[serde(default)]
    pub input_cost_per_token_priority: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token_priority: Option<f64>,

    #[serde(default)]
    pub input_cost_per_character: Option<f64>,

    #[serde(default)]
    pub input_cost_per_image: Option<f64>,
    #[serde(default)]
    pub output_cost_per_image: Option<f64>,
    #[serde(default)]
    pub output_cost_per_pixel: Option<f64>,
    #[serde(default)]
    pub output_cost_per_image_above_tier: Option<f64>,

    #[serde(default)]
    pub input_cost_per_audio_token: Option<f64>,
    #[serde(default)]
    pub output_cost_per_audio_token: Option<f64>,
    #[serde(default)]
    pub input_cost_per_audio_per_second: Option<f64>,
    #[serde(default)]
    pub input_cost_per_second: Option<f64>,
    #[serde(default)]
    pub output_cost_per_video_per_second: Option<f64>,
    #[serde(default)]
    pub output_cost_per_second: Option<f64>,
    #[serde(default)]
    pub input_cost_per_image_token: Option<f64>,
    #[serde(default)]
    pub output_cost_per_image_token: Option<f64>,

    #[serde(default)]
    pub search_context_cost_per_query: Option<f64>,
    #[serde(default)]
    pub code_interpreter_cost_per_session: Option<f64>,
}

impl PricingEntry {
    pub fn new(model: impl Into<String>, provider: impl Into<String>, mode: RequestMode) -> Self {
        Self {
            model: model.into(),
            provider: normalize_provider(&provider.into()),
            mode,
            input_cost_per_token: 0.0,
            output_cost_per_token: 0.0,
            input_cost_per_token_above_128k_tokens: None,
            output_cost_per_token_above_128k_tokens: None,
            input_cost_per_token_above_200k_tokens: None,
            output_cost_per_token_above_200k_tokens: None,
            cache_read_input_token_cost: None,
            cache_creation_input_token_cost: None,
            cache_creation_input_token_cost_above_1hr: None,
            cache_read_input_token_cost_audio: None,
            input_cost_per_token_batches: None,
            output_cost_per_token_batches: None,
            input_cost_per_token_priority: None,
            output_cost_per_token_priority: None,
            input_cost_per_character: None,
            input_cost_per_image: None,
            output_cost_per_image: None,
            output_cost_per_pixel: None,
            output_cost_per_image_above_tier: None,
            input_cost_per_audio_token: None,
            output_cost_per_audio_token: None,
            input_cost_per_audio_per_second: None,
            input_cost_per_second: None,
            output_cost_per_video_per_second: None,
            output_cost_per_second: None,
            input_cost_per_image_token: None,
            output_cost_per_image_token: None,
            search_context_cost_per_query: None,
            code_interpreter_cost_per_session: None,
        }
    }

    pub fn key(&self) -> PricingKey {
        PricingKey::new(self.model.clone(), self.provider.clone(), self.mode)
    }
}
