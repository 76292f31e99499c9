// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use engram_model::{Message, Role, SessionContext, ToolCall};
use engram_trace::{NoopTracer, Span, Tracer};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::schema;

// ─── Row types ────────────────────────────────────────────────────────────────

/// One session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub agent_id: Option<String>,
    pub parent_session_id: Option<String>,
    /// Free-form context blob owned by the hosting application
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            agent_id: None,
            parent_session_id: None,
            context: Value::Null,
            created_at: now,
            updated_at: now,
            total_cost_usd: 0.0,
            total_tokens: 0,
        }
    }
}

/// A persisted message together with its store-assigned id.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub message: Message,
}

/// One L2-summary (or similar) snapshot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub session_id: String,
    pub snapshot_type: String,
    pub summary: String,
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A BM25-ranked full-text hit.  Lower `rank` means a better match.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub message_id: i64,
    pub message: Message,
    pub rank: f64,
}

/// Content-addressed blob metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub path: Option<String>,
    pub source: Option<String>,
    pub source_agent_id: Option<String>,
    pub purpose: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub deleted_at: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
}

impl Artifact {
    /// New artifact with a sha256 checksum over `content`.
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            path: None,
            source: None,
            source_agent_id: None,
            purpose: None,
            content_type: None,
            size_bytes: content.len() as u64,
            checksum: Some(hex::encode(Sha256::digest(content))),
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            tags: Vec::new(),
            metadata: Value::Null,
            deleted_at: None,
            session_id: None,
        }
    }
}

/// Cross-tenant aggregates for operator tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub session_count: u64,
    pub message_count: u64,
    pub artifact_count: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub db_size_bytes: u64,
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// The single-file embedded session store.
///
/// A shared handle; clone freely; all clones serialize on one connection.
/// Every operation hops through `spawn_blocking` so the async caller never
/// blocks on SQLite I/O, and opens a `store.<op>` span on the tracer.
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
    tracer: Arc<dyn Tracer>,
}

impl SessionStore {
    /// Open (creating and migrating as needed) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_tracer(path, Arc::new(NoopTracer)).await
    }

    pub async fn open_with_tracer(
        path: impl AsRef<Path>,
        tracer: Arc<dyn Tracer>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut conn = Connection::open(&path)?;
            schema::migrate(&mut conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tracer,
        })
    }

    /// In-memory store for tests and ephemeral deployments.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, StoreError> {
            let mut conn = Connection::open_in_memory()?;
            schema::migrate(&mut conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tracer: Arc::new(NoopTracer),
        })
    }

    /// Run `f` on the connection inside `spawn_blocking`, under a
    /// `store.<op>` span carrying the session id when one applies.
    async fn call<F, R>(
        &self,
        op: &'static str,
        session_id: Option<&str>,
        f: F,
    ) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let attrs = match session_id {
            Some(id) => vec![("session_id", id.to_string())],
            None => Vec::new(),
        };
        let _span = Span::start(self.tracer.clone(), format!("store.{op}"), attrs);
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Insert or update a session row.  `created_at` is preserved on update.
    pub async fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let r = record.clone();
        self.call("save_session", Some(&record.id), move |conn| {
            conn.execute(
                "INSERT INTO sessions \
                     (id, agent_id, parent_session_id, context_json, created_at, updated_at, \
                      total_cost_usd, total_tokens) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(id) DO UPDATE SET \
                     agent_id = excluded.agent_id, \
                     parent_session_id = excluded.parent_session_id, \
                     context_json = excluded.context_json, \
                     updated_at = excluded.updated_at, \
                     total_cost_usd = excluded.total_cost_usd, \
                     total_tokens = excluded.total_tokens",
                params![
                    r.id,
                    r.agent_id,
                    r.parent_session_id,
                    json_to_sql(&r.context),
                    r.created_at.to_rfc3339(),
                    r.updated_at.to_rfc3339(),
                    r.total_cost_usd,
                    r.total_tokens as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let id_owned = id.to_string();
        self.call("load_session", Some(id), move |conn| {
            conn.query_row(
                "SELECT id, agent_id, parent_session_id, context_json, created_at, updated_at, \
                        total_cost_usd, total_tokens \
                 FROM sessions WHERE id = ?1",
                params![id_owned],
                row_to_session,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// All sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.call("list_sessions", None, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, parent_session_id, context_json, created_at, updated_at, \
                        total_cost_usd, total_tokens \
                 FROM sessions ORDER BY updated_at DESC",
            )?;
            let rows = stmt.query_map([], row_to_session)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
        .await
    }

    /// Delete a session; `ON DELETE CASCADE` clears its messages and snapshots.
    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let id_owned = id.to_string();
        self.call("delete_session", Some(id), move |conn| {
            let affected = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id_owned.clone()])?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("session {id_owned}")));
            }
            Ok(())
        })
        .await
    }

    // ── Messages ──────────────────────────────────────────────────────────────

    /// Append a message, bump the session counters, and index it for search.
    /// Returns the store-assigned monotonic id.
    pub async fn save_message(
        &self,
        session_id: &str,
        message: &Message,
    ) -> Result<i64, StoreError> {
        let sid = session_id.to_string();
        let msg = message.clone();
        self.call("save_message", Some(session_id), move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages \
                     (session_id, role, content, tool_calls_json, tool_use_id, \
                      tool_result_json, session_context, timestamp, token_count, cost_usd) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    sid,
                    msg.role.to_string(),
                    msg.content,
                    tool_calls_to_sql(&msg.tool_calls)?,
                    msg.tool_use_id,
                    msg.tool_result.as_ref().and_then(json_to_sql),
                    msg.session_context.to_string(),
                    msg.timestamp.to_rfc3339(),
                    msg.token_count as i64,
                    msg.cost_usd,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO messages_fts(rowid, content) VALUES (?1, ?2)",
                params![id, msg.content],
            )?;
            tx.execute(
                "UPDATE sessions SET \
                     total_tokens = total_tokens + ?1, \
                     total_cost_usd = total_cost_usd + ?2, \
                     updated_at = ?3 \
                 WHERE id = ?4",
                params![
                    msg.token_count as i64,
                    msg.cost_usd,
                    Utc::now().to_rfc3339(),
                    sid
                ],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    /// Messages in chronological (insertion) order.  `limit = None` returns
    /// everything; `offset` skips from the start of the conversation.
    pub async fn load_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let sid = session_id.to_string();
        self.call("load_messages", Some(session_id), move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, tool_calls_json, tool_use_id, tool_result_json, \
                        session_context, timestamp, token_count, cost_usd \
                 FROM messages WHERE session_id = ?1 \
                 ORDER BY id ASC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(
                params![
                    sid,
                    limit.map(|l| l as i64).unwrap_or(-1),
                    offset.unwrap_or(0) as i64
                ],
                row_to_stored_message,
            )?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
        .await
    }

    /// The last `n` messages in chronological order (reattachment replay).
    pub async fn load_message_tail(
        &self,
        session_id: &str,
        n: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let sid = session_id.to_string();
        self.call("load_message_tail", Some(session_id), move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, tool_calls_json, tool_use_id, tool_result_json, \
                        session_context, timestamp, token_count, cost_usd \
                 FROM messages WHERE session_id = ?1 \
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![sid, n as i64], row_to_stored_message)?;
            let mut out = rows.collect::<Result<Vec<_>, _>>()?;
            out.reverse();
            Ok(out)
        })
        .await
    }

    pub async fn message_count(&self, session_id: &str) -> Result<u64, StoreError> {
        let sid = session_id.to_string();
        self.call("message_count", Some(session_id), move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                params![sid],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    // ── Memory snapshots ──────────────────────────────────────────────────────

    pub async fn save_memory_snapshot(&self, snapshot: &MemorySnapshot) -> Result<(), StoreError> {
        let s = snapshot.clone();
        self.call("save_memory_snapshot", Some(&snapshot.session_id), move |conn| {
            conn.execute(
                "INSERT INTO memory_snapshots \
                     (session_id, snapshot_type, summary, token_count, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    s.session_id,
                    s.snapshot_type,
                    s.summary,
                    s.token_count as i64,
                    s.created_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent snapshot of the given type, if any.
    pub async fn latest_memory_snapshot(
        &self,
        session_id: &str,
        snapshot_type: &str,
    ) -> Result<Option<MemorySnapshot>, StoreError> {
        let sid = session_id.to_string();
        let ty = snapshot_type.to_string();
        self.call("latest_memory_snapshot", Some(session_id), move |conn| {
            conn.query_row(
                "SELECT session_id, snapshot_type, summary, token_count, created_at \
                 FROM memory_snapshots \
                 WHERE session_id = ?1 AND snapshot_type = ?2 \
                 ORDER BY rowid DESC LIMIT 1",
                params![sid, ty],
                row_to_snapshot,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// Full snapshot history (all types), oldest first.
    pub async fn memory_snapshot_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<MemorySnapshot>, StoreError> {
        let sid = session_id.to_string();
        self.call("memory_snapshot_history", Some(session_id), move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, snapshot_type, summary, token_count, created_at \
                 FROM memory_snapshots WHERE session_id = ?1 ORDER BY rowid ASC",
            )?;
            let rows = stmt.query_map(params![sid], row_to_snapshot)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
        .await
    }

    // ── Full-text search ──────────────────────────────────────────────────────

    /// BM25-ranked search over the session's message content.
    ///
    /// An empty or whitespace-only query returns an empty list; this is not
    /// an error.  Query terms are quoted before matching so FTS operator
    /// characters in user input cannot break the query.
    pub async fn search_fts(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };
        let sid = session_id.to_string();
        self.call("search_fts", Some(session_id), move |conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.role, m.content, m.tool_calls_json, m.tool_use_id, \
                        m.tool_result_json, m.session_context, m.timestamp, m.token_count, \
                        m.cost_usd, bm25(messages_fts) AS rank \
                 FROM messages_fts \
                 JOIN messages m ON m.id = messages_fts.rowid \
                 WHERE messages_fts MATCH ?1 AND m.session_id = ?2 \
                 ORDER BY rank ASC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![match_expr, sid, limit as i64], |row| {
                let stored = row_to_stored_message(row)?;
                let rank: f64 = row.get(10)?;
                Ok(SearchHit {
                    message_id: stored.id,
                    message: stored.message,
                    rank,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
        .await
    }

    // ── Artifacts ─────────────────────────────────────────────────────────────

    pub async fn save_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let a = artifact.clone();
        let sid = artifact.session_id.clone();
        self.call("save_artifact", sid.as_deref(), move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO artifacts \
                     (id, name, path, source, source_agent_id, purpose, content_type, \
                      size_bytes, checksum, created_at, updated_at, last_accessed_at, \
                      access_count, tags, metadata_json, deleted_at, session_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    a.id,
                    a.name,
                    a.path,
                    a.source,
                    a.source_agent_id,
                    a.purpose,
                    a.content_type,
                    a.size_bytes as i64,
                    a.checksum,
                    a.created_at.to_rfc3339(),
                    a.updated_at.to_rfc3339(),
                    a.last_accessed_at.map(|t| t.to_rfc3339()),
                    a.access_count as i64,
                    serde_json::to_string(&a.tags).unwrap_or_else(|_| "[]".into()),
                    json_to_sql(&a.metadata),
                    a.deleted_at.map(|t| t.to_rfc3339()),
                    a.session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_artifact(&self, id: &str) -> Result<Option<Artifact>, StoreError> {
        let id_owned = id.to_string();
        self.call("load_artifact", None, move |conn| {
            conn.query_row(
                "SELECT id, name, path, source, source_agent_id, purpose, content_type, \
                        size_bytes, checksum, created_at, updated_at, last_accessed_at, \
                        access_count, tags, metadata_json, deleted_at, session_id \
                 FROM artifacts WHERE id = ?1",
                params![id_owned],
                row_to_artifact,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// Record one read access on the artifact.
    pub async fn touch_artifact(&self, id: &str) -> Result<(), StoreError> {
        let id_owned = id.to_string();
        self.call("touch_artifact", None, move |conn| {
            let affected = conn.execute(
                "UPDATE artifacts SET access_count = access_count + 1, last_accessed_at = ?1 \
                 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id_owned.clone()],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("artifact {id_owned}")));
            }
            Ok(())
        })
        .await
    }

    // ── Admin reads (RLS-bypassing; operator tooling only) ────────────────────

    /// Every session regardless of agent ownership.
    pub async fn admin_list_all_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.call("admin_list_all_sessions", None, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, parent_session_id, context_json, created_at, updated_at, \
                        total_cost_usd, total_tokens \
                 FROM sessions ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map([], row_to_session)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
        .await
    }

    /// Session counts grouped by owning agent id (the store's user
    /// dimension).  Sessions without an agent id group under the empty string.
    pub async fn count_sessions_by_user(&self) -> Result<Vec<(String, u64)>, StoreError> {
        self.call("count_sessions_by_user", None, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT COALESCE(agent_id, ''), COUNT(*) FROM sessions \
                 GROUP BY COALESCE(agent_id, '') ORDER BY 1",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
        .await
    }

    pub async fn system_stats(&self) -> Result<SystemStats, StoreError> {
        self.call("system_stats", None, move |conn| {
            let session_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
            let message_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
            let artifact_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM artifacts", [], |r| r.get(0))?;
            let (total_tokens, total_cost_usd): (i64, f64) = conn.query_row(
                "SELECT COALESCE(SUM(total_tokens), 0), COALESCE(SUM(total_cost_usd), 0.0) \
                 FROM sessions",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
            Ok(SystemStats {
                session_count: session_count as u64,
                message_count: message_count as u64,
                artifact_count: artifact_count as u64,
                total_tokens: total_tokens as u64,
                total_cost_usd,
                db_size_bytes: (page_count * page_size) as u64,
            })
        })
        .await
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn json_to_sql(v: &Value) -> Option<String> {
    if v.is_null() {
        None
    } else {
        Some(v.to_string())
    }
}

fn tool_calls_to_sql(calls: &[ToolCall]) -> Result<Option<String>, StoreError> {
    if calls.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(calls)
        .map(Some)
        .map_err(|e| StoreError::StorageFailed(e.to_string()))
}

fn conversion_err(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(conversion_err)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let context: Option<String> = row.get(3)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        parent_session_id: row.get(2)?,
        context: context
            .map(|s| serde_json::from_str(&s).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        created_at: parse_ts(&row.get::<_, String>(4)?)?,
        updated_at: parse_ts(&row.get::<_, String>(5)?)?,
        total_cost_usd: row.get(6)?,
        total_tokens: row.get::<_, i64>(7)? as u64,
    })
}

/// Columns: id, role, content, tool_calls_json, tool_use_id, tool_result_json,
/// session_context, timestamp, token_count, cost_usd (in that order).
fn row_to_stored_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role: String = row.get(1)?;
    let role: Role = role
        .parse()
        .map_err(|e: String| conversion_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    let tool_calls: Vec<ToolCall> = match row.get::<_, Option<String>>(3)? {
        Some(s) => serde_json::from_str(&s).map_err(conversion_err)?,
        None => Vec::new(),
    };
    let tool_result: Option<Value> = match row.get::<_, Option<String>>(5)? {
        Some(s) => Some(serde_json::from_str(&s).map_err(conversion_err)?),
        None => None,
    };
    let ctx: String = row.get(6)?;
    let session_context: SessionContext = ctx
        .parse()
        .unwrap_or_default();
    Ok(StoredMessage {
        id: row.get(0)?,
        message: Message {
            role,
            content: row.get(2)?,
            tool_calls,
            tool_use_id: row.get(4)?,
            tool_result,
            session_context,
            timestamp: parse_ts(&row.get::<_, String>(7)?)?,
            token_count: row.get::<_, i64>(8)? as usize,
            cost_usd: row.get(9)?,
        },
    })
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemorySnapshot> {
    Ok(MemorySnapshot {
        session_id: row.get(0)?,
        snapshot_type: row.get(1)?,
        summary: row.get(2)?,
        token_count: row.get::<_, i64>(3)? as usize,
        created_at: parse_ts(&row.get::<_, String>(4)?)?,
    })
}

fn row_to_artifact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
    let tags: Vec<String> = match row.get::<_, Option<String>>(13)? {
        Some(s) => serde_json::from_str(&s).unwrap_or_default(),
        None => Vec::new(),
    };
    let metadata: Value = match row.get::<_, Option<String>>(14)? {
        Some(s) => serde_json::from_str(&s).unwrap_or(Value::Null),
        None => Value::Null,
    };
    Ok(Artifact {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        source: row.get(3)?,
        source_agent_id: row.get(4)?,
        purpose: row.get(5)?,
        content_type: row.get(6)?,
        size_bytes: row.get::<_, i64>(7)? as u64,
        checksum: row.get(8)?,
        created_at: parse_ts(&row.get::<_, String>(9)?)?,
        updated_at: parse_ts(&row.get::<_, String>(10)?)?,
        last_accessed_at: row
            .get::<_, Option<String>>(11)?
            .map(|s| parse_ts(&s))
            .transpose()?,
        access_count: row.get::<_, i64>(12)? as u64,
        tags,
        metadata,
        deleted_at: row
            .get::<_, Option<String>>(15)?
            .map(|s| parse_ts(&s))
            .transpose()?,
        session_id: row.get(16)?,
    })
}

/// Quote every whitespace-separated term so FTS5 operator syntax in user
/// input is treated literally.  Terms without any alphanumeric content are
/// dropped (a quoted phrase with zero tokens is an FTS5 syntax error).
/// Returns `None` when nothing searchable remains.
fn fts_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
