//! Builds a query embedding for a creator and pulls ranked exemplars.

use crate::embedding::{decode_embedding, EmbeddingDecodeError, EmbeddingError, EmbeddingProvider};
use crate::store::{CorpusMatch, CorpusStore, Model, ModelStore, SimilarityQuery};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::ranking::{ARCHETYPE_MATCH, LEVER_MATCH};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model {0} has no voice embedding; save the voice profile to generate one")]
    MissingEmbedding(String),

    #[error("Model {model_id} has a malformed voice embedding ({source}); re-save the voice profile to regenerate it")]
    MalformedEmbedding {
        model_id: String,
        #[source]
        source: EmbeddingDecodeError,
    },

    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Corpus store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    pub limit: usize,
    pub min_similarity: f32,
    pub diversify: bool,
    pub per_hook_type: usize,
    pub hook_type_filter: Option<Vec<String>>,
    pub thematic_query: Option<String>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_similarity: 0.3,
            diversify: true,
            per_hook_type: 2,
            hook_type_filter: None,
            thematic_query: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub corpus_size: usize,
    pub returned: usize,
    pub mean_similarity: f32,
    pub archetype_matches: usize,
    pub lever_matches: usize,
}

impl RetrievalStats {
    fn from_matches(corpus_size: usize, matches: &[CorpusMatch]) -> Self {
        let count_reason = |reason: &str| {
            matches
                .iter()
                .filter(|m| m.match_reasons.iter().any(|r| r == reason))
                .count()
        };
        let mean_similarity = if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|m| m.similarity_score).sum::<f32>() / matches.len() as f32
        };
        Self {
            corpus_size,
            returned: matches.len(),
            mean_similarity,
            archetype_matches: count_reason(ARCHETYPE_MATCH),
            lever_matches: count_reason(LEVER_MATCH),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub matches: Vec<CorpusMatch>,
    pub stats: RetrievalStats,
}

pub struct CorpusRetriever {
    models: Arc<dyn ModelStore>,
    corpus: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl CorpusRetriever {
    pub fn new(
        models: Arc<dyn ModelStore>,
        corpus: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            models,
            corpus,
            embedder,
        }
    }

    pub async fn retrieve(
        &self,
        model_id: &str,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult, RetrievalError> {
        let model = self
            .models
            .get_model(model_id)?
            .ok_or_else(|| RetrievalError::ModelNotFound(model_id.to_string()))?;
        self.retrieve_for(&model, options).await
    }

    /// Retrieve exemplars for an already-loaded model.
    ///
    /// Parasocial lever strengths are passed as a lever filter. Personality
    /// archetypes are never passed: corpus `script_archetype` is a
    /// content-type taxonomy unrelated to them.
    pub async fn retrieve_for(
        &self,
        model: &Model,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult, RetrievalError> {
        let embedding = self.query_embedding(model, options).await?;

        let levers = &model.voice_profile.parasocial.strengths;
        let query = SimilarityQuery {
            embedding,
            min_similarity: options.min_similarity,
            limit: options.limit,
            per_hook_type: options.per_hook_type.max(1),
            hook_types: options.hook_type_filter.clone(),
            archetype_filter: None,
            lever_filter: (!levers.is_empty()).then(|| levers.clone()),
        };

        let matches = if options.diversify {
            self.corpus.search_diversified(&query)?
        } else {
            self.corpus.search(&query)?
        };
        let stats = RetrievalStats::from_matches(self.corpus.count()?, &matches);

        info!(
            model_id = %model.id,
            returned = stats.returned,
            corpus_size = stats.corpus_size,
            mean_similarity = stats.mean_similarity,
            lever_matches = stats.lever_matches,
            "Corpus retrieval complete"
        );
        Ok(RetrievalResult { matches, stats })
    }

    async fn query_embedding(
        &self,
        model: &Model,
        options: &RetrievalOptions,
    ) -> Result<Vec<f32>, RetrievalError> {
        if let Some(theme) = options
            .thematic_query
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            let text = format!("{}\n\n{}", theme, model.voice_profile.bio_context());
            debug!(model_id = %model.id, "Embedding thematic query");
            return Ok(self.embedder.embed(&text).await?);
        }

        let raw = model
            .embedding
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| RetrievalError::MissingEmbedding(model.id.clone()))?;
        decode_embedding(raw).map_err(|source| RetrievalError::MalformedEmbedding {
            model_id: model.id.clone(),
            source,
        })
    }
}
