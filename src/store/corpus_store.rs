//! SQLite-backed corpus store.
//!
//! Embeddings are stored as JSON array text and ranked in process; rows whose
//! embedding fails to decode are skipped with a warning.

use super::models::{CorpusCandidate, CorpusMatch, NewCorpusEntry, SimilarityQuery};
use super::schema::CORPUS_SCHEMA;
use super::trait_def::CorpusStore;
use super::{lock, parse_json_array, to_json_array};
use crate::corpus::ranking::{rank_diversified, rank_flat};
use crate::embedding::{decode_embedding, encode_embedding};
use crate::sqlite_persistence::{open_read_connection, open_write_connection};
use anyhow::{bail, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SqliteCorpusStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

/// Hash of whitespace-normalized, lowercased content; the dedup key.
pub fn content_hash(content: &str) -> String {
    let normalized = content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

impl SqliteCorpusStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let write_conn = open_write_connection(path, &CORPUS_SCHEMA, "corpus")?;
        let read_conn = open_read_connection(path, "corpus")?;

        let (total, embedded): (usize, usize) = read_conn.query_row(
            "SELECT COUNT(*), COUNT(embedding) FROM corpus",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        info!("Corpus store ready: {} entries, {} embedded", total, embedded);

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }

    fn load_candidates(&self) -> Result<Vec<CorpusCandidate>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, content, hook, hook_type, script_archetype, parasocial_levers,
                    quality_score, embedding
             FROM corpus WHERE embedding IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (id, content, hook, hook_type, script_archetype, levers, quality, raw) in rows {
            let embedding = match decode_embedding(&raw) {
                Ok(e) => e,
                Err(e) => {
                    warn!(id, "Skipping corpus entry with bad embedding: {}", e);
                    continue;
                }
            };
            candidates.push(CorpusCandidate {
                id,
                content,
                hook,
                hook_type,
                script_archetype,
                parasocial_levers: parse_json_array(&levers),
                quality_score: quality.map(|q| q as f32),
                embedding,
            });
        }
        Ok(candidates)
    }
}

impl CorpusStore for SqliteCorpusStore {
    fn insert_entry(&self, entry: &NewCorpusEntry) -> Result<Option<i64>> {
        if entry.content.trim().is_empty() {
            bail!("Corpus entry content is empty");
        }
        let conn = lock(&self.write_conn)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO corpus (content, content_hash, hook, hook_type, script_archetype,
                                           parasocial_levers, quality_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.content,
                content_hash(&entry.content),
                entry.hook,
                entry.hook_type,
                entry.script_archetype,
                to_json_array(&entry.parasocial_levers)?,
                entry.quality_score.map(|q| q as f64),
            ],
        )?;
        if inserted == 0 {
            debug!("Skipping duplicate corpus entry");
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn count(&self) -> Result<usize> {
        let conn = lock(&self.read_conn)?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM corpus", [], |r| r.get(0))?;
        Ok(count)
    }

    fn search(&self, query: &SimilarityQuery) -> Result<Vec<CorpusMatch>> {
        Ok(rank_flat(self.load_candidates()?, query))
    }

    fn search_diversified(&self, query: &SimilarityQuery) -> Result<Vec<CorpusMatch>> {
        Ok(rank_diversified(self.load_candidates()?, query))
    }

    fn entries_missing_embedding(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, content FROM corpus WHERE embedding IS NULL ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
        Ok(rows)
    }

    fn set_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            bail!("Refusing to store an empty embedding for corpus entry {}", id);
        }
        let conn = lock(&self.write_conn)?;
        let changed = conn.execute(
            "UPDATE corpus SET embedding = ?1 WHERE id = ?2",
            params![encode_embedding(embedding), id],
        )?;
        if changed == 0 {
            bail!("Corpus entry {} not found", id);
        }
        Ok(())
    }
}
