//! OpenAI-compatible embedding provider implementation.
//!
//! Works with OpenAI and any other service implementing the `/embeddings`
//! endpoint of the OpenAI API.

use super::{EmbeddingError, EmbeddingProvider, MAX_EMBEDDING_BATCH};
use crate::llm::ApiKeySource;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible embedding provider.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: Option<u32>,
    batch_size: usize,
    timeout: Duration,
    api_key_source: ApiKeySource,
}

impl OpenAiEmbeddingProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "https://api.openai.com/v1").
    /// * `model` - Embedding model (e.g., "text-embedding-3-small").
    /// * `api_key_source` - Where to read the API key from.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key_source: ApiKeySource) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions: None,
            batch_size: MAX_EMBEDDING_BATCH,
            timeout: Duration::from_secs(60),
            api_key_source,
        }
    }

    /// Request vectors of a fixed dimensionality.
    pub fn with_dimensions(mut self, dimensions: Option<u32>) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Cap inputs per request; clamped to [`MAX_EMBEDDING_BATCH`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_EMBEDDING_BATCH);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: self.model.clone(),
            input: input.to_vec(),
            dimensions: self.dimensions,
        };

        debug!(model = %self.model, inputs = input.len(), "Sending embedding request");

        let mut req_builder = self.client.post(&url).json(&body);
        if let Some(api_key) = self
            .api_key_source
            .get_key()
            .await
            .map_err(|e| EmbeddingError::Connection(e.to_string()))?
        {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse embedding response: {}", e))
        })?;

        order_embeddings(parsed.data, input.len())
    }
}

/// Sort response rows by index and check every input got a vector.
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "Expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.request(chunk).await?);
        }
        Ok(out)
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        self.embed("ping").await.map(|_| ())
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
