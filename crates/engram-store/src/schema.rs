// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Schema initialization and forward migration.
//!
//! The stored schema version lives in `PRAGMA user_version`:
//!
//! - `0`: fresh database (no tables yet)
//! - `1`: v1.0.0: base tables, no `artifacts.session_id`, no FTS index
//! - `2`: v1.0.1: adds `artifacts.session_id`
//! - `3`: adds the `messages_fts` FTS5 index with backfill
//!
//! Each step is additive, idempotent, and wrapped in its own transaction, so
//! a failure leaves the database at the previous version.  A fresh database
//! is created directly at [`CURRENT_VERSION`].

use rusqlite::Connection;

use crate::error::StoreError;

pub const CURRENT_VERSION: i64 = 3;

/// Base DDL as it shipped in v1.0.0.  Used by migration tests to seed an
/// old-format database; the live schema is produced by `create_latest`.
pub(crate) const SCHEMA_V1_0_0: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        agent_id TEXT,
        parent_session_id TEXT,
        context_json TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        total_cost_usd REAL NOT NULL DEFAULT 0,
        total_tokens INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY(parent_session_id) REFERENCES sessions(id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        tool_calls_json TEXT,
        tool_use_id TEXT,
        tool_result_json TEXT,
        session_context TEXT NOT NULL DEFAULT 'direct',
        timestamp TEXT NOT NULL,
        token_count INTEGER NOT NULL DEFAULT 0,
        cost_usd REAL NOT NULL DEFAULT 0,
        FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);

    CREATE TABLE IF NOT EXISTS artifacts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        path TEXT,
        source TEXT,
        source_agent_id TEXT,
        purpose TEXT,
        content_type TEXT,
        size_bytes INTEGER NOT NULL DEFAULT 0,
        checksum TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_accessed_at TEXT,
        access_count INTEGER NOT NULL DEFAULT 0,
        tags TEXT,
        metadata_json TEXT,
        deleted_at TEXT
    );

    CREATE TABLE IF NOT EXISTS memory_snapshots (
        session_id TEXT NOT NULL,
        snapshot_type TEXT NOT NULL,
        summary TEXT NOT NULL,
        token_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_snapshots_session
        ON memory_snapshots(session_id, snapshot_type);
"#;

const FTS_DDL: &str = r#"
    CREATE VIRTUAL TABLE messages_fts USING fts5(
        content,
        content='messages',
        content_rowid='id'
    );
"#;

/// Open-time entry point: create a fresh schema or walk the migration chain.
pub fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    loop {
        let version = user_version(conn)?;
        match version {
            0 => create_latest(conn)?,
            1 => migrate_v1_to_v2(conn)?,
            2 => migrate_v2_to_v3(conn)?,
            v if v >= CURRENT_VERSION => return Ok(()),
            v => {
                return Err(StoreError::Migration {
                    version: v,
                    message: "unknown schema version".into(),
                })
            }
        }
    }
}

fn user_version(conn: &Connection) -> Result<i64, StoreError> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(v)
}

fn set_user_version(conn: &Connection, v: i64) -> Result<(), StoreError> {
    // PRAGMA does not support bound parameters
    conn.execute_batch(&format!("PRAGMA user_version = {v}"))?;
    Ok(())
}

/// Fresh database: full current schema in one transaction.
fn create_latest(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1_0_0)?;
    tx.execute_batch("ALTER TABLE artifacts ADD COLUMN session_id TEXT;")?;
    tx.execute_batch(FTS_DDL)?;
    set_user_version(&tx, CURRENT_VERSION)?;
    tx.commit()?;
    Ok(())
}

/// v1.0.0 → v1.0.1: add `artifacts.session_id` when absent.
fn migrate_v1_to_v2(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    if !column_exists(&tx, "artifacts", "session_id")? {
        tx.execute_batch("ALTER TABLE artifacts ADD COLUMN session_id TEXT;")?;
    }
    set_user_version(&tx, 2)?;
    tx.commit().map_err(|e| StoreError::Migration {
        version: 1,
        message: e.to_string(),
    })
}

/// v1.0.1 → current: build the FTS index and backfill existing messages.
fn migrate_v2_to_v3(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    if !table_exists(&tx, "messages_fts")? {
        tx.execute_batch(FTS_DDL)?;
        tx.execute_batch(
            "INSERT INTO messages_fts(rowid, content) SELECT id, content FROM messages;",
        )?;
    }
    set_user_version(&tx, 3)?;
    tx.commit().map_err(|e| StoreError::Migration {
        version: 2,
        message: e.to_string(),
    })
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Seed a database at schema v1.0.0 (test support for the migration path).
#[doc(hidden)]
pub fn seed_v1_0_0(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1_0_0)?;
    set_user_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
