//! Embedding provider abstraction and vector helpers.

mod openai;

pub use openai::OpenAiEmbeddingProvider;

use async_trait::async_trait;
use thiserror::Error;

/// Upper bound on inputs per batch request.
pub const MAX_EMBEDDING_BATCH: usize = 2048;

/// Errors that can occur when calling an embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
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
}

/// Converts text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embedding model identifier.
    fn model(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts; the output preserves input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> Result<(), EmbeddingError>;
}

/// A stored embedding could not be decoded.
#[derive(Debug, Error, PartialEq)]
pub enum EmbeddingDecodeError {
    #[error("embedding is empty")]
    Empty,

    #[error("embedding is not a JSON array of numbers: {0}")]
    Malformed(String),

    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// Decode an embedding stored as a JSON array string (`"[0.1, -0.2, ...]"`).
pub fn decode_embedding(raw: &str) -> Result<Vec<f32>, EmbeddingDecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EmbeddingDecodeError::Empty);
    }
    let values: Vec<f32> = serde_json::from_str(trimmed)
        .map_err(|e| EmbeddingDecodeError::Malformed(e.to_string()))?;
    if values.is_empty() {
        return Err(EmbeddingDecodeError::Empty);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingDecodeError::NonFinite);
    }
    Ok(values)
}

/// Encode an embedding for storage.
pub fn encode_embedding(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
