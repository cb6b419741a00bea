//! Persistence traits used by the pipeline and the operational commands.

use super::models::{
    BatchRecord, CorpusMatch, Model, NewCorpusEntry, NewScript, ScriptStatus, SimilarityQuery,
    StoredScript,
};
use anyhow::Result;

/// Creator records.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait ModelStore: Send + Sync {
    /// Get a model by ID.
    fn get_model(&self, id: &str) -> Result<Option<Model>>;

    /// Insert or replace a model.
    fn upsert_model(&self, model: &Model) -> Result<()>;

    /// Opening excerpts of the model's approved scripts, newest first.
    /// Each excerpt is at most `max_chars` characters.
    fn approved_script_excerpts(
        &self,
        model_id: &str,
        limit: usize,
        max_chars: usize,
    ) -> Result<Vec<String>>;
}

/// Generated scripts and per-run batch records.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait ScriptStore: Send + Sync {
    /// Insert scripts as drafts in a single transaction, returning their IDs.
    fn insert_scripts(&self, scripts: &[NewScript]) -> Result<Vec<i64>>;

    fn get_script(&self, id: i64) -> Result<Option<StoredScript>>;

    /// Scripts of a model, optionally restricted to one status, newest first.
    fn list_scripts(
        &self,
        model_id: &str,
        status: Option<ScriptStatus>,
    ) -> Result<Vec<StoredScript>>;

    /// Returns false if no script has this ID.
    fn update_script_status(&self, id: i64, status: ScriptStatus) -> Result<bool>;

    fn insert_batch(&self, batch: &BatchRecord) -> Result<()>;

    fn get_batch(&self, id: &str) -> Result<Option<BatchRecord>>;
}

/// Exemplar corpus with in-process similarity ranking.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait CorpusStore: Send + Sync {
    /// Insert an entry; returns `None` when identical content is already stored.
    fn insert_entry(&self, entry: &NewCorpusEntry) -> Result<Option<i64>>;

    /// Number of corpus rows.
    fn count(&self) -> Result<usize>;

    /// Flat top-K by similarity.
    fn search(&self, query: &SimilarityQuery) -> Result<Vec<CorpusMatch>>;

    /// Top-K with at most `per_hook_type` rows per hook type.
    fn search_diversified(&self, query: &SimilarityQuery) -> Result<Vec<CorpusMatch>>;

    /// `(id, content)` of rows with no embedding yet, lowest ID first.
    fn entries_missing_embedding(&self, limit: usize) -> Result<Vec<(i64, String)>>;

    fn set_embedding(&self, id: i64, embedding: &[f32]) -> Result<()>;
}
