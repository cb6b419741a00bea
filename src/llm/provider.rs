//! LLM provider trait definition.

use super::types::{CompletionRequest, CompletionResponse, ModelTier};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Options for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Which model tier serves the request.
    pub tier: ModelTier,
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Request timeout.
    pub timeout: Duration,
}

impl CompletionOptions {
    pub fn new(tier: ModelTier, temperature: f32) -> Self {
        Self {
            tier,
            temperature,
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            tier: ModelTier::Mid,
            temperature: 0.7,
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Trait for LLM providers.
///
/// Implementations resolve a [`ModelTier`] to a concrete model and return the
/// generated text with token counters.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider's name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Get the model serving the given tier.
    fn model_for(&self, tier: ModelTier) -> &str;

    /// Run a single-turn completion.
    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError>;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> Result<(), LlmError>;
}
