//! Anthropic Messages API provider implementation.

use super::key_source::ApiKeySource;
use super::provider::{CompletionOptions, LlmError, LlmProvider};
use super::types::{CompletionRequest, CompletionResponse, FinishReason, ModelTier, TierModels, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic LLM provider.
///
/// Connects to the `/v1/messages` endpoint. One provider serves all three
/// tiers; the tier picks the model name per request.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    models: TierModels,
    api_key_source: ApiKeySource,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "https://api.anthropic.com").
    /// * `models` - Model name for each tier.
    /// * `api_key_source` - Where to read the API key from.
    pub fn new(base_url: impl Into<String>, models: TierModels, api_key_source: ApiKeySource) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            models,
            api_key_source,
        }
    }

    async fn api_key(&self) -> Result<String, LlmError> {
        self.api_key_source
            .get_key()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?
            .ok_or_else(|| LlmError::Connection("No Anthropic API key configured".to_string()))
    }
}

fn map_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Connection(e.to_string())
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        self.models.model_for(tier)
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let model = self.models.model_for(options.tier).to_string();

        let body = MessagesRequest {
            model: model.clone(),
            max_tokens: options.max_tokens,
            temperature: Some(options.temperature),
            system: request.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        debug!(
            model = %model,
            tier = options.tier.as_str(),
            prompt_chars = request.prompt.len(),
            "Sending completion request to Anthropic"
        );

        let api_key = self.api_key().await?;
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse(format!("Failed to parse Anthropic response: {}", e))
        })?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::InvalidResponse(
                "No text blocks in Anthropic response".to_string(),
            ));
        }

        let finish_reason = match parsed.stop_reason.as_deref() {
            Some("max_tokens") => FinishReason::MaxTokens,
            _ => FinishReason::Stop,
        };

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        debug!(
            finish_reason = ?finish_reason,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received completion response from Anthropic"
        );

        Ok(CompletionResponse {
            text,
            finish_reason,
            usage,
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let url = format!("{}/v1/models", self.base_url);
        let api_key = self.api_key().await?;

        let response = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(LlmError::Api {
                status: response.status().as_u16(),
                message: "Health check failed".to_string(),
            });
        }

        Ok(())
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
