//! Embedder returning the same vector for every input.

use super::constants::EMBEDDING_DIMS;
use async_trait::async_trait;
use hookforge::embedding::{EmbeddingError, EmbeddingProvider};

pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), EMBEDDING_DIMS);
        Self { vector }
    }
}

impl Default for FixedEmbedder {
    fn default() -> Self {
        Self::new(vec![1.0, 0.0, 0.0, 0.0])
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed-test-embedder"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector.clone())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}
