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

//! Error taxonomy for the pricing engine.
//!
//! The hot path (`Lookup`, `Resolve`, `Cost`) never returns an error: a miss
//! is a `None` or a `0.0`. Only mutation and lifecycle operations return
//! `PricingEngineError`.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PricingEngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("override {id} failed to compile: {reason}")]
    Compile { id: String, reason: String },

    #[error("datasheet fetch failed: {0}")]
    Fetch(String),

    #[error("repository error: {0}")]
    Repository(String),
}

pub type Result<T> = std::result::Result<T, PricingEngineError>;
