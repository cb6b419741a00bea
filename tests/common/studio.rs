//! A pipeline wired to temp-dir SQLite stores and the scripted fakes.

use super::constants::MODEL_ID;
use super::fake_embedder::FixedEmbedder;
use super::fixtures::{seed_corpus, test_model};
use super::scripted_llm::{ScriptedLlm, ScriptedVerdict};
use hookforge::corpus::CorpusRetriever;
use hookforge::pipeline::{Pipeline, PipelineConfig, PipelineRequest, RetryPolicy, StageContext};
use hookforge::store::{ModelStore, SqliteCorpusStore, SqliteStudioStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct TestStudio {
    pub studio_store: Arc<SqliteStudioStore>,
    pub corpus_store: Arc<SqliteCorpusStore>,
    pub llm: Arc<ScriptedLlm>,
    pub config: PipelineConfig,
    pub cancellation_token: CancellationToken,
    _temp_dir: TempDir,
}

impl TestStudio {
    /// Fresh databases with the test model and a small embedded corpus.
    pub fn spawn(verdict: ScriptedVerdict) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let studio_store =
            Arc::new(SqliteStudioStore::new(temp_dir.path().join("studio.db")).unwrap());
        let corpus_store =
            Arc::new(SqliteCorpusStore::new(temp_dir.path().join("corpus.db")).unwrap());
        studio_store.upsert_model(&test_model()).unwrap();
        seed_corpus(corpus_store.as_ref());

        let config = PipelineConfig {
            transform_retry: RetryPolicy::new(2, Duration::ZERO),
            ..Default::default()
        };

        Self {
            studio_store,
            corpus_store,
            llm: Arc::new(ScriptedLlm::new(verdict)),
            config,
            cancellation_token: CancellationToken::new(),
            _temp_dir: temp_dir,
        }
    }

    pub fn context(&self) -> StageContext {
        StageContext::new(self.llm.clone(), self.cancellation_token.clone())
            .with_batch_delay(Duration::ZERO)
            .with_call_timeout(Duration::from_secs(5))
    }

    pub fn pipeline(&self) -> Pipeline {
        let retriever = CorpusRetriever::new(
            self.studio_store.clone(),
            self.corpus_store.clone(),
            Arc::new(FixedEmbedder::default()),
        );
        Pipeline::new(
            self.studio_store.clone(),
            self.studio_store.clone(),
            retriever,
            self.context(),
            self.config.clone(),
        )
    }

    pub fn request(&self, hook_count: usize) -> PipelineRequest {
        PipelineRequest::new(MODEL_ID, hook_count)
    }
}
