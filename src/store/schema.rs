//! SQLite schema definitions for the studio and corpus databases.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const MODEL_FK: ForeignKey = ForeignKey {
    foreign_table: "models",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// Creators and their voice profiles.
const MODELS_TABLE: Table = Table {
    name: "models",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("voice_profile", &SqlType::Text, non_null = true), // JSON
        sqlite_column!("archetype_tags", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!(
            "explicitness_tier",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("embedding", &SqlType::Text), // JSON array
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

const SCRIPTS_TABLE: Table = Table {
    name: "scripts",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "model_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&MODEL_FK)
        ),
        sqlite_column!("batch_id", &SqlType::Text),
        sqlite_column!("hook", &SqlType::Text, non_null = true),
        sqlite_column!("hook_type", &SqlType::Text, non_null = true),
        sqlite_column!("content", &SqlType::Text, non_null = true),
        sqlite_column!("parasocial_levers", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("voice_fidelity_score", &SqlType::Real),
        sqlite_column!("word_count", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'draft'")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_scripts_model_id", "model_id"),
        ("idx_scripts_status", "status"),
    ],
};

/// One row per pipeline run.
const BATCHES_TABLE: Table = Table {
    name: "batches",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "model_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&MODEL_FK)
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("hooks_generated", &SqlType::Integer, non_null = true),
        sqlite_column!("scripts_expanded", &SqlType::Integer, non_null = true),
        sqlite_column!("scripts_transformed", &SqlType::Integer, non_null = true),
        sqlite_column!("scripts_passed", &SqlType::Integer, non_null = true),
        sqlite_column!("revision_attempts", &SqlType::Integer, non_null = true),
        sqlite_column!("stage_tokens", &SqlType::Text, non_null = true), // JSON object
        sqlite_column!("total_time_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("estimated_cost_usd", &SqlType::Real, non_null = true),
        sqlite_column!("avg_fidelity", &SqlType::Real),
        sqlite_column!("avg_word_count", &SqlType::Real),
    ],
    indices: &[("idx_batches_model_id", "model_id")],
};

pub const STUDIO_SCHEMA: VersionedSchema = VersionedSchema {
    version: 0,
    tables: &[MODELS_TABLE, SCRIPTS_TABLE, BATCHES_TABLE],
};

/// Prior viral scripts used as retrieval exemplars.
const CORPUS_TABLE: Table = Table {
    name: "corpus",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("content", &SqlType::Text, non_null = true),
        sqlite_column!(
            "content_hash",
            &SqlType::Text,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!("hook", &SqlType::Text),
        sqlite_column!("hook_type", &SqlType::Text),
        sqlite_column!("script_archetype", &SqlType::Text),
        sqlite_column!("parasocial_levers", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("quality_score", &SqlType::Real),
        sqlite_column!("embedding", &SqlType::Text), // JSON array
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_corpus_hook_type", "hook_type")],
};

pub const CORPUS_SCHEMA: VersionedSchema = VersionedSchema {
    version: 0,
    tables: &[CORPUS_TABLE],
};
