//! End-to-end tests for corpus ingestion, embedding backfill and retrieval

mod common;

use common::{test_model, FixedEmbedder};
use hookforge::corpus::{
    backfill_embeddings, ingest_delimited, CorpusRetriever, RetrievalOptions,
};
use hookforge::store::{CorpusStore, ModelStore, SqliteCorpusStore, SqliteStudioStore};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn long_script(topic: &str, n: usize) -> String {
    format!(
        "So here is the thing about {} number {} that I keep coming back to every single night \
         when I am lying awake and scrolling through old messages wondering why",
        topic, n
    )
}

fn corpus_csv(hook_types: &[&str], per_type: usize) -> String {
    let mut csv = String::from("content,hook,hook_type,script_archetype,parasocial_levers,quality_score\n");
    for hook_type in hook_types {
        for n in 0..per_type {
            csv.push_str(&format!(
                "\"{}\",,{},storytime,\"intimacy,exclusivity\",0.8\n",
                long_script(hook_type, n),
                hook_type
            ));
        }
    }
    csv
}

#[tokio::test]
async fn test_ingest_and_backfill_are_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteCorpusStore::new(temp_dir.path().join("corpus.db")).unwrap();
    let mut csv = corpus_csv(&["confession", "tease"], 3);
    csv.push_str("\"too short to keep\",,tease,,,\n");
    csv.push_str(&format!("\"{} link in bio\",,tease,,,\n", long_script("promo", 0)));

    let first = ingest_delimited(&store, &csv, ',').unwrap();
    assert_eq!(first.inserted, 6);
    assert_eq!(first.skipped_short, 1);
    assert_eq!(first.skipped_boilerplate, 1);

    let second = ingest_delimited(&store, &csv, ',').unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 6);
    assert_eq!(store.count().unwrap(), 6);

    let embedder = FixedEmbedder::default();
    let mut progress = Vec::new();
    let report = backfill_embeddings(&store, &embedder, 4, None, |n| progress.push(n))
        .await
        .unwrap();
    assert_eq!(report.embedded, 6);
    assert_eq!(report.batches, 2);
    assert_eq!(progress, vec![4, 6]);
    assert!(store.entries_missing_embedding(10).unwrap().is_empty());

    let again = backfill_embeddings(&store, &embedder, 4, None, |_| {})
        .await
        .unwrap();
    assert_eq!(again.embedded, 0);
}

#[tokio::test]
async fn test_backfill_respects_limit() {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteCorpusStore::new(temp_dir.path().join("corpus.db")).unwrap();
    ingest_delimited(&store, &corpus_csv(&["question"], 5), ',').unwrap();

    let report = backfill_embeddings(&store, &FixedEmbedder::default(), 2, Some(3), |_| {})
        .await
        .unwrap();

    assert_eq!(report.embedded, 3);
    assert_eq!(store.entries_missing_embedding(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_diversified_retrieval_caps_each_hook_type() {
    let temp_dir = TempDir::new().unwrap();
    let studio = Arc::new(SqliteStudioStore::new(temp_dir.path().join("studio.db")).unwrap());
    let corpus = Arc::new(SqliteCorpusStore::new(temp_dir.path().join("corpus.db")).unwrap());
    let model = test_model();
    studio.upsert_model(&model).unwrap();

    let hook_types = ["confession", "question", "hot_take", "tease", "challenge", "relatable"];
    ingest_delimited(corpus.as_ref(), &corpus_csv(&hook_types, 4), ',').unwrap();
    backfill_embeddings(corpus.as_ref(), &FixedEmbedder::default(), 100, None, |_| {})
        .await
        .unwrap();

    let retriever = CorpusRetriever::new(studio, corpus, Arc::new(FixedEmbedder::default()));
    let options = RetrievalOptions {
        limit: 10,
        per_hook_type: 2,
        diversify: true,
        ..Default::default()
    };
    let result = retriever.retrieve(&model.id, &options).await.unwrap();

    assert!(result.matches.len() <= 10);
    let mut per_type: HashMap<String, usize> = HashMap::new();
    for m in &result.matches {
        *per_type.entry(m.hook_type.clone().unwrap()).or_default() += 1;
        assert!(m.match_reasons.iter().any(|r| r == "lever_match"));
    }
    assert!(per_type.values().all(|&n| n <= 2), "{:?}", per_type);
    assert_eq!(result.stats.corpus_size, 24);
    assert_eq!(result.stats.lever_matches, result.matches.len());
}
