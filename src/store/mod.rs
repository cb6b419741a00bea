mod corpus_store;
mod models;
mod schema;
mod studio_store;
mod trait_def;

pub use corpus_store::{content_hash, SqliteCorpusStore};
pub use models::{
    BatchRecord, CorpusCandidate, CorpusMatch, Model, NewCorpusEntry, NewScript, ScriptStatus,
    SimilarityQuery, StoredScript,
};
pub use studio_store::SqliteStudioStore;
pub use trait_def::{CorpusStore, ModelStore, ScriptStore};

#[cfg(feature = "mock")]
pub use trait_def::{MockCorpusStore, MockModelStore, MockScriptStore};

use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};

fn lock(conn: &Mutex<rusqlite::Connection>) -> Result<MutexGuard<'_, rusqlite::Connection>> {
    conn.lock()
        .map_err(|_| anyhow!("database connection mutex poisoned"))
}

fn to_json_array(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

/// Decode a JSON string array column; malformed values read as empty.
fn parse_json_array(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Malformed JSON array in db: {}: {}", raw, e);
        Vec::new()
    })
}
