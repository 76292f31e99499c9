// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::convert::TableData;
use crate::error::StoreError;
use crate::result_types::build_preview;

/// Metadata for one materialized SQL result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlResultMeta {
    pub table_name: String,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub preview: Value,
    pub stored_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl SqlResultMeta {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.stored_at + chrono::Duration::seconds(self.ttl_secs as i64)
    }
}

/// Columns + rows returned from a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Embedded relational engine for SQL-queryable results.
///
/// Each stored result becomes a table `lr_<id>`; conversions of JSON/CSV
/// payloads materialize short-lived `temp_<ref>_<nanos>` tables that the TTL
/// sweep drops.  Queries reference the data by the literal table name
/// `results`, which is substituted before execution.
pub struct SqlResultStore {
    conn: Arc<Mutex<Connection>>,
    tables: Arc<Mutex<HashMap<String, SqlResultMeta>>>,
    ttl_secs: u64,
}

impl SqlResultStore {
    pub fn in_memory(ttl_secs: u64) -> Result<Self, StoreError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            tables: Arc::new(Mutex::new(HashMap::new())),
            ttl_secs,
        })
    }

    /// Materialize `data` as the primary table for reference `id`.
    pub async fn store(&self, id: &str, data: TableData) -> Result<SqlResultMeta, StoreError> {
        let table_name = format!("lr_{}", sanitize_identifier(id));
        let meta = self.materialize(&table_name, &data).await?;
        self.tables.lock().unwrap().insert(id.to_string(), meta.clone());
        Ok(meta)
    }

    /// Materialize `data` as a uniquely named temporary table and register it
    /// for TTL cleanup.  Returns the table name for query substitution.
    pub async fn create_temp_table(
        &self,
        ref_id: &str,
        data: &TableData,
    ) -> Result<String, StoreError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::StorageFailed(e.to_string()))?
            .as_nanos();
        let table_name = format!("temp_{}_{nanos}", sanitize_identifier(ref_id));
        let meta = self.materialize(&table_name, data).await?;
        self.tables
            .lock()
            .unwrap()
            .insert(table_name.clone(), meta);
        Ok(table_name)
    }

    async fn materialize(
        &self,
        table_name: &str,
        data: &TableData,
    ) -> Result<SqlResultMeta, StoreError> {
        if data.columns.is_empty() {
            return Err(StoreError::ConversionFailed(
                "cannot materialize a table with no columns".into(),
            ));
        }
        let conn = self.conn.clone();
        let table = table_name.to_string();
        let data = data.clone();
        let ttl_secs = self.ttl_secs;
        tokio::task::spawn_blocking(move || -> Result<SqlResultMeta, StoreError> {
            let mut guard = conn.lock().unwrap();
            let tx = guard.transaction()?;

            let column_list = data
                .columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            tx.execute_batch(&format!(
                "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} ({column_list});",
                t = quote_identifier(&table)
            ))?;

            let placeholders = (1..=data.columns.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} VALUES ({placeholders})",
                    quote_identifier(&table)
                ))?;
                for row in &data.rows {
                    let bound: Vec<rusqlite::types::Value> =
                        row.iter().map(bind_value).collect();
                    stmt.execute(rusqlite::params_from_iter(bound))?;
                }
            }
            tx.commit()?;

            debug!(table = %table, rows = data.rows.len(), "materialized sql result");
            let preview_rows: Vec<Value> = data
                .rows
                .iter()
                .map(|row| {
                    let mut obj = serde_json::Map::new();
                    for (c, v) in data.columns.iter().zip(row) {
                        obj.insert(c.clone(), v.clone());
                    }
                    Value::Object(obj)
                })
                .collect();
            Ok(SqlResultMeta {
                table_name: table.clone(),
                row_count: data.rows.len(),
                column_count: data.columns.len(),
                columns: data.columns.clone(),
                preview: build_preview(&preview_rows),
                stored_at: Utc::now(),
                ttl_secs,
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    pub fn metadata(&self, id: &str) -> Result<SqlResultMeta, StoreError> {
        let tables = self.tables.lock().unwrap();
        let meta = tables
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("sql result {id}")))?;
        if meta.is_expired(Utc::now()) {
            return Err(StoreError::NotFound(format!("sql result {id} (expired)")));
        }
        Ok(meta.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tables.lock().unwrap().contains_key(id)
    }

    /// Execute `sql` against the primary table of reference `id`.
    pub async fn query(&self, id: &str, sql: &str) -> Result<QueryRows, StoreError> {
        let meta = self.metadata(id)?;
        self.query_table(&meta.table_name, sql, &meta.columns).await
    }

    /// Execute `sql` with the literal table name `results` substituted by
    /// `table_name` (case-insensitive, whole word).  Failures carry the known
    /// column list as the suggestion.
    pub async fn query_table(
        &self,
        table_name: &str,
        sql: &str,
        known_columns: &[String],
    ) -> Result<QueryRows, StoreError> {
        let substituted = substitute_results_table(sql, table_name);
        let conn = self.conn.clone();
        let suggestion = format!("known columns: {}", known_columns.join(", "));
        tokio::task::spawn_blocking(move || -> Result<QueryRows, StoreError> {
            let guard = conn.lock().unwrap();
            let mut stmt = guard.prepare(&substituted).map_err(|e| StoreError::QueryFailed {
                message: e.to_string(),
                suggestion: Some(suggestion.clone()),
            })?;
            let columns: Vec<String> =
                stmt.column_names().iter().map(|c| c.to_string()).collect();
            let n = columns.len();
            let mapped = stmt
                .query_map([], |row| {
                    let mut out = Vec::with_capacity(n);
                    for i in 0..n {
                        out.push(read_value(row, i)?);
                    }
                    Ok(out)
                })
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                .map_err(|e| StoreError::QueryFailed {
                    message: e.to_string(),
                    suggestion: Some(suggestion.clone()),
                })?;
            Ok(QueryRows {
                columns,
                rows: mapped,
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Drop every expired table (primary and temporary).  Returns the number
    /// dropped.  Derivable purely from registered timestamps, so a crashed
    /// sweep simply reruns.
    pub async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let stale: Vec<(String, String)> = {
            let tables = self.tables.lock().unwrap();
            tables
                .iter()
                .filter(|(_, m)| m.is_expired(now))
                .map(|(k, m)| (k.clone(), m.table_name.clone()))
                .collect()
        };
        let count = stale.len();
        if count == 0 {
            return Ok(0);
        }
        let conn = self.conn.clone();
        let names: Vec<String> = stale.iter().map(|(_, t)| t.clone()).collect();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let guard = conn.lock().unwrap();
            for t in names {
                guard.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(&t)))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;
        let mut tables = self.tables.lock().unwrap();
        for (key, _) in stale {
            tables.remove(&key);
        }
        Ok(count)
    }
}

/// Replace the literal table name `results` (case-insensitive, whole word)
/// with the actual table name.  A blind textual substitution; `results`
/// inside string literals is also replaced, an accepted parity caveat.
fn substitute_results_table(sql: &str, table_name: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\bresults\b").expect("valid regex"));
    re.replace_all(sql, quote_identifier(table_name).as_str())
        .into_owned()
}

/// Keep only `[A-Za-z0-9_]` so reference ids cannot inject DDL.
fn sanitize_identifier(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind_value(v: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match v {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

fn read_value(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_table() -> TableData {
        TableData {
            columns: vec!["amount".into(), "name".into()],
            rows: vec![
                vec![json!(10), json!("alice")],
                vec![json!(25), json!("bob")],
                vec![json!(3), json!("carol")],
            ],
        }
    }

    #[tokio::test]
    async fn store_records_shape_metadata() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        let meta = s.store("r1", sample_table()).await.unwrap();
        assert_eq!(meta.row_count, 3);
        assert_eq!(meta.column_count, 2);
        assert_eq!(meta.columns, vec!["amount", "name"]);
        assert!(meta.table_name.starts_with("lr_"));
    }

    #[tokio::test]
    async fn query_substitutes_the_results_table() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        s.store("r1", sample_table()).await.unwrap();
        let out = s
            .query("r1", "SELECT name FROM results WHERE amount > 5 ORDER BY amount")
            .await
            .unwrap();
        assert_eq!(out.columns, vec!["name"]);
        assert_eq!(out.rows, vec![vec![json!("alice")], vec![json!("bob")]]);
    }

    #[tokio::test]
    async fn substitution_is_case_insensitive() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        s.store("r1", sample_table()).await.unwrap();
        let out = s.query("r1", "SELECT COUNT(*) AS n FROM Results").await.unwrap();
        assert_eq!(out.rows[0][0], json!(3));
    }

    #[tokio::test]
    async fn substitution_leaves_other_words_alone() {
        assert_eq!(
            substitute_results_table("SELECT resultset FROM results", "lr_x"),
            "SELECT resultset FROM \"lr_x\""
        );
    }

    #[tokio::test]
    async fn failed_query_carries_known_columns_suggestion() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        s.store("r1", sample_table()).await.unwrap();
        let err = s
            .query("r1", "SELECT missing_col FROM results")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "query_failed");
        let suggestion = err.suggestion().unwrap();
        assert!(suggestion.contains("amount"));
        assert!(suggestion.contains("name"));
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        let err = s.query("ghost", "SELECT 1").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn temp_tables_are_uniquely_named_and_queryable() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        let t1 = s.create_temp_table("ref", &sample_table()).await.unwrap();
        let t2 = s.create_temp_table("ref", &sample_table()).await.unwrap();
        assert_ne!(t1, t2);
        assert!(t1.starts_with("temp_ref_"));

        let out = s
            .query_table(&t1, "SELECT COUNT(*) AS n FROM results", &[])
            .await
            .unwrap();
        assert_eq!(out.rows[0][0], json!(3));
    }

    #[tokio::test]
    async fn empty_columns_fail_materialization() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        let err = s
            .store(
                "r1",
                TableData {
                    columns: vec![],
                    rows: vec![],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conversion_failed");
    }

    #[tokio::test]
    async fn cleanup_drops_expired_tables() {
        let s = SqlResultStore::in_memory(0).unwrap();
        s.store("r1", sample_table()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let dropped = s.cleanup_expired().await.unwrap();
        assert_eq!(dropped, 1);
        assert!(!s.contains("r1"));
        // The table itself must be gone from SQLite too.
        let err = s
            .query_table("lr_r1", "SELECT * FROM results", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "query_failed");
    }

    #[tokio::test]
    async fn identifier_sanitization_blocks_injection() {
        assert_eq!(sanitize_identifier("ref-1; DROP TABLE x"), "ref_1__DROP_TABLE_x");
    }

    #[tokio::test]
    async fn numeric_and_null_values_round_trip() {
        let s = SqlResultStore::in_memory(3600).unwrap();
        let data = TableData {
            columns: vec!["v".into()],
            rows: vec![vec![json!(1.5)], vec![Value::Null], vec![json!(7)]],
        };
        s.store("r1", data).await.unwrap();
        let out = s.query("r1", "SELECT v FROM results").await.unwrap();
        assert_eq!(out.rows[0][0], json!(1.5));
        assert_eq!(out.rows[1][0], Value::Null);
        assert_eq!(out.rows[2][0], json!(7));
    }
}
