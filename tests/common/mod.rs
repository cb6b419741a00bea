//! Common test infrastructure
//!
//! Pipeline integration tests run against SQLite stores in a temp directory,
//! a scripted LLM that answers each stage from its prompt, and a fixed
//! embedder.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestStudio, ScriptedVerdict, MODEL_ID};
//!
//! #[tokio::test]
//! async fn test_run() {
//!     let studio = TestStudio::spawn(ScriptedVerdict::Pass);
//!     let result = studio.pipeline().run(&studio.request(5)).await.unwrap();
//!     assert!(!result.scripts.is_empty());
//! }
//! ```

mod constants;
mod fake_embedder;
mod fixtures;
mod scripted_llm;
mod studio;

// Public API - this is what tests import
pub use constants::*;
pub use fake_embedder::FixedEmbedder;
pub use scripted_llm::{scripted_hook, LlmStage, RecordedCall, ScriptedLlm, ScriptedVerdict};
pub use studio::TestStudio;

#[allow(unused_imports)]
pub(crate) use fixtures::{seed_corpus, test_model};
