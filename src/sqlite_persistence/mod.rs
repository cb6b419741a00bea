mod versioned_schema;

pub use versioned_schema::*;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Create the schema on an empty database; otherwise require the stored
/// version to match and the tables to validate.
pub fn ensure_schema(conn: &Connection, schema: &VersionedSchema, db_name: &str) -> Result<()> {
    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;
    if table_count == 0 {
        info!("Creating {} db schema at version {}", db_name, schema.version);
        return schema.create(conn);
    }

    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    let expected = (BASE_DB_VERSION + schema.version) as i64;
    if db_version != expected {
        let found = if db_version >= BASE_DB_VERSION as i64 {
            (db_version - BASE_DB_VERSION as i64).to_string()
        } else {
            "none".to_string()
        };
        bail!(
            "{} db has schema version {}, expected {}",
            db_name,
            found,
            schema.version
        );
    }

    schema
        .validate(conn)
        .with_context(|| format!("{} db schema does not match version {}", db_name, schema.version))
}

/// Open a read-write connection in WAL mode, creating or checking the schema.
pub fn open_write_connection(path: &Path, schema: &VersionedSchema, db_name: &str) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open {} database", db_name))?;

    ensure_schema(&conn, schema, db_name)?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .with_context(|| format!("Failed to set WAL mode on {} write connection", db_name))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Open a read-only connection to an already-initialized database.
pub fn open_read_connection(path: &Path, db_name: &str) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open {} database for reading", db_name))?;
    Ok(conn)
}
