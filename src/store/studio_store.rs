//! SQLite-backed store for models, scripts and batch records.

use super::models::{BatchRecord, Model, NewScript, ScriptStatus, StoredScript};
use super::schema::STUDIO_SCHEMA;
use super::trait_def::{ModelStore, ScriptStore};
use super::{lock, parse_json_array, to_json_array};
use crate::sqlite_persistence::{open_read_connection, open_write_connection};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCRIPT_COLUMNS: &str = "id, model_id, batch_id, hook, hook_type, content, parasocial_levers,
     voice_fidelity_score, word_count, status, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteStudioStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

impl SqliteStudioStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let write_conn = open_write_connection(path, &STUDIO_SCHEMA, "studio")?;
        let read_conn = open_read_connection(path, "studio")?;

        let models: usize = read_conn.query_row("SELECT COUNT(*) FROM models", [], |r| r.get(0))?;
        let scripts: usize =
            read_conn.query_row("SELECT COUNT(*) FROM scripts", [], |r| r.get(0))?;
        info!("Studio store ready: {} models, {} scripts", models, scripts);

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }
}

fn script_from_row(row: &Row) -> rusqlite::Result<StoredScript> {
    let levers: String = row.get(6)?;
    let status: String = row.get(9)?;
    let word_count: i64 = row.get(8)?;
    Ok(StoredScript {
        id: row.get(0)?,
        model_id: row.get(1)?,
        batch_id: row.get(2)?,
        hook: row.get(3)?,
        hook_type: row.get(4)?,
        content: row.get(5)?,
        parasocial_levers: parse_json_array(&levers),
        voice_fidelity_score: row.get::<_, Option<f64>>(7)?.map(|s| s as f32),
        word_count: word_count.max(0) as usize,
        status: ScriptStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(9, status.clone(), rusqlite::types::Type::Text)
        })?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl ModelStore for SqliteStudioStore {
    fn get_model(&self, id: &str) -> Result<Option<Model>> {
        let conn = lock(&self.read_conn)?;
        let row = conn
            .query_row(
                "SELECT id, name, voice_profile, archetype_tags, explicitness_tier, embedding
                 FROM models WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, profile, tags, tier, embedding)) = row else {
            return Ok(None);
        };
        let voice_profile = serde_json::from_str(&profile)
            .with_context(|| format!("Malformed voice profile for model {}", id))?;
        Ok(Some(Model {
            id,
            name,
            voice_profile,
            archetype_tags: parse_json_array(&tags),
            explicitness_tier: tier.clamp(0, u8::MAX as i64) as u8,
            embedding,
        }))
    }

    fn upsert_model(&self, model: &Model) -> Result<()> {
        let conn = lock(&self.write_conn)?;
        conn.execute(
            "INSERT INTO models (id, name, voice_profile, archetype_tags, explicitness_tier, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                voice_profile = excluded.voice_profile,
                archetype_tags = excluded.archetype_tags,
                explicitness_tier = excluded.explicitness_tier,
                embedding = excluded.embedding,
                updated_at = cast(strftime('%s','now') as int)",
            params![
                model.id,
                model.name,
                serde_json::to_string(&model.voice_profile)?,
                to_json_array(&model.archetype_tags)?,
                model.explicitness_tier as i64,
                model.embedding,
            ],
        )?;
        Ok(())
    }

    fn approved_script_excerpts(
        &self,
        model_id: &str,
        limit: usize,
        max_chars: usize,
    ) -> Result<Vec<String>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT content FROM scripts WHERE model_id = ?1 AND status = 'approved'
             ORDER BY updated_at DESC, id DESC LIMIT ?2",
        )?;
        let excerpts = stmt
            .query_map(params![model_id, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
            .into_iter()
            .map(|content| content.chars().take(max_chars).collect::<String>())
            .filter(|excerpt| !excerpt.trim().is_empty())
            .collect();
        Ok(excerpts)
    }
}

impl ScriptStore for SqliteStudioStore {
    fn insert_scripts(&self, scripts: &[NewScript]) -> Result<Vec<i64>> {
        let mut conn = lock(&self.write_conn)?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(scripts.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO scripts (model_id, batch_id, hook, hook_type, content, parasocial_levers,
                                      voice_fidelity_score, word_count, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for script in scripts {
                stmt.execute(params![
                    script.model_id,
                    script.batch_id,
                    script.hook,
                    script.hook_type,
                    script.content,
                    to_json_array(&script.parasocial_levers)?,
                    script.voice_fidelity_score.map(|s| s as f64),
                    script.word_count as i64,
                    ScriptStatus::Draft.as_str(),
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    fn get_script(&self, id: i64) -> Result<Option<StoredScript>> {
        let conn = lock(&self.read_conn)?;
        let script = conn
            .query_row(
                &format!("SELECT {} FROM scripts WHERE id = ?1", SCRIPT_COLUMNS),
                params![id],
                script_from_row,
            )
            .optional()?;
        Ok(script)
    }

    fn list_scripts(
        &self,
        model_id: &str,
        status: Option<ScriptStatus>,
    ) -> Result<Vec<StoredScript>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM scripts WHERE model_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC",
            SCRIPT_COLUMNS
        ))?;
        let scripts = stmt
            .query_map(
                params![model_id, status.map(|s| s.as_str())],
                script_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scripts)
    }

    fn update_script_status(&self, id: i64, status: ScriptStatus) -> Result<bool> {
        let conn = lock(&self.write_conn)?;
        let changed = conn.execute(
            "UPDATE scripts SET status = ?1, updated_at = cast(strftime('%s','now') as int)
             WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    fn insert_batch(&self, batch: &BatchRecord) -> Result<()> {
        let conn = lock(&self.write_conn)?;
        conn.execute(
            "INSERT INTO batches (id, model_id, created_at, hooks_generated, scripts_expanded,
                                  scripts_transformed, scripts_passed, revision_attempts,
                                  stage_tokens, total_time_ms, estimated_cost_usd,
                                  avg_fidelity, avg_word_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                batch.id,
                batch.model_id,
                batch.created_at.timestamp(),
                batch.hooks_generated as i64,
                batch.scripts_expanded as i64,
                batch.scripts_transformed as i64,
                batch.scripts_passed as i64,
                batch.revision_attempts,
                serde_json::to_string(&batch.stage_tokens)?,
                batch.total_time_ms as i64,
                batch.estimated_cost_usd,
                batch.avg_fidelity.map(|v| v as f64),
                batch.avg_word_count.map(|v| v as f64),
            ],
        )?;
        Ok(())
    }

    fn get_batch(&self, id: &str) -> Result<Option<BatchRecord>> {
        let conn = lock(&self.read_conn)?;
        let row = conn
            .query_row(
                "SELECT id, model_id, created_at, hooks_generated, scripts_expanded,
                        scripts_transformed, scripts_passed, revision_attempts, stage_tokens,
                        total_time_ms, estimated_cost_usd, avg_fidelity, avg_word_count
                 FROM batches WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        (
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ),
                        (
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, u32>(7)?,
                        ),
                        row.get::<_, String>(8)?,
                        (
                            row.get::<_, i64>(9)?,
                            row.get::<_, f64>(10)?,
                            row.get::<_, Option<f64>>(11)?,
                            row.get::<_, Option<f64>>(12)?,
                        ),
                    ))
                },
            )
            .optional()?;

        let Some((
            (id, model_id, created_at),
            (hooks, expanded, transformed, passed, revisions),
            stage_tokens,
            (total_time_ms, cost, avg_fidelity, avg_word_count),
        )) = row
        else {
            return Ok(None);
        };

        let created_at = DateTime::<Utc>::from_timestamp(created_at, 0)
            .with_context(|| format!("Invalid created_at for batch {}", id))?;
        Ok(Some(BatchRecord {
            stage_tokens: serde_json::from_str(&stage_tokens)
                .with_context(|| format!("Malformed stage_tokens for batch {}", id))?,
            id,
            model_id,
            created_at,
            hooks_generated: hooks.max(0) as usize,
            scripts_expanded: expanded.max(0) as usize,
            scripts_transformed: transformed.max(0) as usize,
            scripts_passed: passed.max(0) as usize,
            revision_attempts: revisions,
            total_time_ms: total_time_ms.max(0) as u64,
            estimated_cost_usd: cost,
            avg_fidelity: avg_fidelity.map(|v| v as f32),
            avg_word_count: avg_word_count.map(|v| v as f32),
        }))
    }
}
