// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use engram_trace::{NoopTracer, Span, Tracer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::convert::{csv_to_table, json_array_to_table, TableData};
use crate::error::StoreError;
use crate::memory_results::MemoryResultStore;
use crate::reference::{DataRef, StorageLocation};
use crate::result_types::{retrieval_hints, DataType, SchemaDescriptor};
use crate::sql_results::{QueryRows, SqlResultStore};

/// Default page size when `limit` is omitted.
const DEFAULT_PAGE_LIMIT: usize = 100;

/// Generate a fresh reference id.  Writes of the same id are undefined, so
/// callers that do not track their own ids should use this.
pub fn new_reference_id() -> String {
    format!("res_{}", uuid::Uuid::new_v4().simple())
}

/// The second disclosure step: either relational rows (SQL path) or a
/// paginated slice (offset/limit path).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Rows(QueryRows),
    Page {
        items: Vec<Value>,
        offset: usize,
        limit: usize,
        returned_count: usize,
        total_count: usize,
        has_more: bool,
    },
}

/// Parameters of the second disclosure step.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub sql: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Outcome of routing a tool output through `stash_if_large`.
#[derive(Debug, Clone)]
pub enum StashOutcome {
    /// Small enough: the original text goes into the message log as-is.
    Inline(String),
    /// Stashed: the log gets `replacement` (carrying the `DataRef` string).
    Stashed {
        reference: DataRef,
        replacement: String,
    },
}

/// The first disclosure step: everything about a result except its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataReport {
    pub reference_id: String,
    pub location: StorageLocation,
    pub data_type: DataType,
    pub size_bytes: usize,
    pub estimated_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDescriptor>,
    pub preview: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub retrieval_hints: Vec<String>,
}

/// Content-addressed store for oversize tool outputs.
///
/// Routes between the heap/disk sub-store and the embedded SQL engine, and
/// implements the progressive-disclosure protocol: metadata + preview first,
/// data only on an explicit second request.
pub struct LargeResultStore {
    memory: MemoryResultStore,
    sql: Option<SqlResultStore>,
    /// id → (location, size) for DataRef construction and routing
    locations: Mutex<HashMap<String, (StorageLocation, usize)>>,
    tracer: Arc<dyn Tracer>,
}

impl LargeResultStore {
    pub fn new(
        swap_dir: Option<PathBuf>,
        spill_threshold_bytes: usize,
        ttl_secs: u64,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            memory: MemoryResultStore::new(swap_dir, spill_threshold_bytes, ttl_secs),
            sql: Some(SqlResultStore::in_memory(ttl_secs)?),
            locations: Mutex::new(HashMap::new()),
            tracer: Arc::new(NoopTracer),
        })
    }

    /// Heap-only store with the SQL engine attached; the common test setup.
    pub fn in_memory(ttl_secs: u64) -> Result<Self, StoreError> {
        Ok(Self {
            memory: MemoryResultStore::in_memory(ttl_secs),
            sql: Some(SqlResultStore::in_memory(ttl_secs)?),
            locations: Mutex::new(HashMap::new()),
            tracer: Arc::new(NoopTracer),
        })
    }

    /// A store without the SQL engine (deployments that disable it).
    pub fn without_sql(ttl_secs: u64) -> Self {
        Self {
            memory: MemoryResultStore::in_memory(ttl_secs),
            sql: None,
            locations: Mutex::new(HashMap::new()),
            tracer: Arc::new(NoopTracer),
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    fn span(&self, op: &str, id: &str) -> Span {
        Span::start(
            self.tracer.clone(),
            format!("results.{op}"),
            vec![("reference_id", id.to_string())],
        )
    }

    // ── Storage ───────────────────────────────────────────────────────────────

    /// Store raw bytes (JSON array / CSV / text detection applies) and return
    /// the reference to embed in the message log.
    pub async fn store_bytes(
        &self,
        id: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<DataRef, StoreError> {
        let _span = self.span("store_bytes", id);
        let size = bytes.len();
        let (_meta, location) = self.memory.store(id, bytes, content_type).await?;
        self.locations
            .lock()
            .unwrap()
            .insert(id.to_string(), (location, size));
        Ok(DataRef::new(id, location, size as u64))
    }

    /// Materialize an already-relational result in the SQL engine.
    pub async fn store_sql_result(
        &self,
        id: &str,
        data: TableData,
    ) -> Result<DataRef, StoreError> {
        let _span = self.span("store_sql_result", id);
        let sql = self.sql.as_ref().ok_or_else(|| {
            StoreError::StoreNotAvailable("SQL result store is not configured".into())
        })?;
        let size = serde_json::to_string(&data.rows).map_or(0, |s| s.len());
        sql.store(id, data).await?;
        self.locations
            .lock()
            .unwrap()
            .insert(id.to_string(), (StorageLocation::Database, size));
        Ok(DataRef::new(id, StorageLocation::Database, size as u64))
    }

    /// Route a tool output: small payloads pass through inline, anything
    /// above `threshold_bytes` is stashed and replaced by a reference string
    /// for the message log.
    pub async fn stash_if_large(
        &self,
        output: &str,
        threshold_bytes: usize,
    ) -> Result<StashOutcome, StoreError> {
        if output.len() <= threshold_bytes {
            return Ok(StashOutcome::Inline(output.to_string()));
        }
        let id = new_reference_id();
        let reference = self
            .store_bytes(&id, output.as_bytes().to_vec(), None)
            .await?;
        let report = self.get_metadata(&reference.to_string()).await?;
        let replacement = format!(
            "[Large result stored out of band: {reference} ({} bytes of {}, ~{} tokens). \
             Use get_tool_result to inspect it and query_tool_result to fetch or filter.]",
            report.size_bytes, report.data_type, report.estimated_tokens,
        );
        Ok(StashOutcome::Stashed {
            reference,
            replacement,
        })
    }

    // ── Progressive disclosure, step 1: metadata ──────────────────────────────

    /// Metadata + preview + retrieval hints.  Never returns the payload.
    pub async fn get_metadata(&self, reference: &str) -> Result<MetadataReport, StoreError> {
        let data_ref = DataRef::parse(reference)?;
        let _span = self.span("get_metadata", &data_ref.id);
        let id = data_ref.id.as_str();

        match self.resolve_location(&data_ref) {
            StorageLocation::Database => {
                let sql = self.require_sql()?;
                let meta = sql.metadata(id)?;
                let size = self.recorded_size(id);
                Ok(MetadataReport {
                    reference_id: id.to_string(),
                    location: StorageLocation::Database,
                    data_type: DataType::SqlResult,
                    size_bytes: size,
                    estimated_tokens: size / 4,
                    schema: Some(SchemaDescriptor {
                        columns: meta.columns.clone(),
                        item_count: meta.row_count,
                    }),
                    preview: meta.preview.clone(),
                    created_at: meta.stored_at,
                    ttl_secs: meta.ttl_secs,
                    retrieval_hints: retrieval_hints(DataType::SqlResult, meta.row_count),
                })
            }
            location => {
                let meta = self.memory.metadata(id)?;
                let item_count = meta.schema.as_ref().map(|s| s.item_count).unwrap_or(0);
                Ok(MetadataReport {
                    reference_id: id.to_string(),
                    location,
                    data_type: meta.data_type,
                    size_bytes: meta.size_bytes,
                    estimated_tokens: meta.estimated_tokens,
                    schema: meta.schema.clone(),
                    preview: meta.preview.clone(),
                    created_at: meta.created_at,
                    ttl_secs: meta.ttl_secs,
                    retrieval_hints: retrieval_hints(meta.data_type, item_count),
                })
            }
        }
    }

    // ── Progressive disclosure, step 2: data ──────────────────────────────────

    /// Fetch or filter the payload.  SQL routes through the embedded engine
    /// (with on-the-fly conversion for JSON/CSV); offset/limit paginates.
    pub async fn query(
        &self,
        reference: &str,
        request: QueryRequest,
    ) -> Result<QueryResponse, StoreError> {
        let data_ref = DataRef::parse(reference)?;
        let _span = self.span("query", &data_ref.id);
        let id = data_ref.id.clone();

        match self.resolve_location(&data_ref) {
            StorageLocation::Database => self.query_sql_result(&id, &request).await,
            _ => self.query_memory_result(&id, &request).await,
        }
    }

    async fn query_sql_result(
        &self,
        id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse, StoreError> {
        let sql = self.require_sql()?;
        if let Some(q) = &request.sql {
            return Ok(QueryResponse::Rows(sql.query(id, q).await?));
        }
        // No SQL: page through the stored rows.
        let meta = sql.metadata(id)?;
        let total = meta.row_count;
        let (offset, limit) = self.page_bounds(request, total)?;
        let rows = sql
            .query(
                id,
                &format!("SELECT * FROM results LIMIT {limit} OFFSET {offset}"),
            )
            .await?;
        let items: Vec<Value> = rows
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (c, v) in rows.columns.iter().zip(row) {
                    obj.insert(c.clone(), v.clone());
                }
                Value::Object(obj)
            })
            .collect();
        Ok(page_response(items, offset, limit, total))
    }

    async fn query_memory_result(
        &self,
        id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse, StoreError> {
        let meta = self.memory.metadata(id)?;
        let bytes = self.memory.get_bytes(id).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        match (meta.data_type, &request.sql) {
            (DataType::JsonArray, None) => {
                let items = parse_json_array(&text)?;
                let total = items.len();
                let (offset, limit) = self.page_bounds(request, total)?;
                let slice: Vec<Value> = items
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .collect();
                Ok(page_response(slice, offset, limit, total))
            }
            (DataType::JsonArray, Some(q)) => {
                let items = parse_json_array(&text)?;
                let table = json_array_to_table(&items)?;
                self.query_converted(id, table, q).await
            }
            (DataType::Csv, Some(q)) => {
                let table = csv_to_table(&text)?;
                self.query_converted(id, table, q).await
            }
            (DataType::Csv, None) => {
                let table = csv_to_table(&text)?;
                let total = table.row_count();
                let (offset, limit) = self.page_bounds(request, total)?;
                let items: Vec<Value> = table
                    .rows
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|row| {
                        let mut obj = serde_json::Map::new();
                        for (c, v) in table.columns.iter().zip(row) {
                            obj.insert(c.clone(), v.clone());
                        }
                        Value::Object(obj)
                    })
                    .collect();
                Ok(page_response(items, offset, limit, total))
            }
            (DataType::Text, Some(_)) => Err(StoreError::UnsupportedType(
                "SQL queries require json_array, csv, or sql_result data; this reference is \
                 plain text"
                    .into(),
            )),
            (DataType::Text, None) => {
                let lines: Vec<Value> =
                    text.lines().map(|l| Value::String(l.to_string())).collect();
                let total = lines.len();
                let (offset, limit) = self.page_bounds(request, total)?;
                let slice: Vec<Value> = lines.into_iter().skip(offset).take(limit).collect();
                Ok(page_response(slice, offset, limit, total))
            }
            (DataType::SqlResult, _) => Err(StoreError::RetrievalFailed(
                "sql_result payloads live in the database store".into(),
            )),
        }
    }

    /// Materialize a converted table under a unique temp name and run the
    /// query against it.  The temp table is reclaimed by the TTL sweep.
    async fn query_converted(
        &self,
        id: &str,
        table: TableData,
        sql: &str,
    ) -> Result<QueryResponse, StoreError> {
        if table.columns.is_empty() {
            // Zero-length arrays convert to an empty relation.
            return Ok(QueryResponse::Rows(QueryRows {
                columns: Vec::new(),
                rows: Vec::new(),
            }));
        }
        let engine = self.require_sql()?;
        let temp = engine.create_temp_table(id, &table).await?;
        let rows = engine.query_table(&temp, sql, &table.columns).await?;
        Ok(QueryResponse::Rows(rows))
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// Evict expired entries from both sub-stores.  Returns
    /// `(memory_evictions, dropped_tables)`.
    pub async fn cleanup_expired(&self) -> Result<(usize, usize), StoreError> {
        let _span = self.span("cleanup_expired", "-");
        let evicted = self.memory.cleanup_expired().await;
        let dropped = match &self.sql {
            Some(sql) => sql.cleanup_expired().await?,
            None => 0,
        };
        Ok((evicted, dropped))
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn require_sql(&self) -> Result<&SqlResultStore, StoreError> {
        self.sql.as_ref().ok_or_else(|| {
            StoreError::StoreNotAvailable("SQL result store is not configured".into())
        })
    }

    /// Prefer the location recorded at store time; fall back to probing the
    /// sub-stores, then to what the reference string claims.
    fn resolve_location(&self, data_ref: &DataRef) -> StorageLocation {
        if let Some((loc, _)) = self.locations.lock().unwrap().get(&data_ref.id) {
            return *loc;
        }
        if self.memory.contains(&data_ref.id) {
            return StorageLocation::Memory;
        }
        if self.sql.as_ref().is_some_and(|s| s.contains(&data_ref.id)) {
            return StorageLocation::Database;
        }
        data_ref.location
    }

    fn recorded_size(&self, id: &str) -> usize {
        self.locations
            .lock()
            .unwrap()
            .get(id)
            .map(|(_, size)| *size)
            .unwrap_or(0)
    }

    /// Validate offset/limit against the item count.
    fn page_bounds(
        &self,
        request: &QueryRequest,
        total: usize,
    ) -> Result<(usize, usize), StoreError> {
        let offset = request.offset.unwrap_or(0);
        if offset >= total && total > 0 {
            return Err(StoreError::InvalidOffset(format!(
                "offset {offset} is past the end of {total} items"
            )));
        }
        Ok((offset, request.limit.unwrap_or(DEFAULT_PAGE_LIMIT)))
    }
}

fn parse_json_array(text: &str) -> Result<Vec<Value>, StoreError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(StoreError::ConversionFailed(
            "payload is valid JSON but not an array".into(),
        )),
        Err(e) => Err(StoreError::ConversionFailed(e.to_string())),
    }
}

fn page_response(items: Vec<Value>, offset: usize, limit: usize, total: usize) -> QueryResponse {
    let returned = items.len();
    QueryResponse::Page {
        returned_count: returned,
        has_more: offset + returned < total,
        items,
        offset,
        limit,
        total_count: total,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn json_items(n: usize) -> Vec<u8> {
        let items: Vec<Value> = (0..n)
            .map(|i| json!({"id": i, "amount": i * 10}))
            .collect();
        serde_json::to_vec(&items).unwrap()
    }

    async fn store_with(n: usize) -> (LargeResultStore, DataRef) {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let r = s.store_bytes("ref_x", json_items(n), None).await.unwrap();
        (s, r)
    }

    // ── Progressive disclosure ────────────────────────────────────────────────

    #[tokio::test]
    async fn metadata_has_preview_and_hints_but_no_payload() {
        let (s, r) = store_with(3000).await;
        let report = s.get_metadata(&r.to_string()).await.unwrap();
        assert_eq!(report.data_type, DataType::JsonArray);
        assert!(report.size_bytes > 0);
        assert_eq!(report.preview.as_array().unwrap().len(), 10);
        assert!(report
            .retrieval_hints
            .iter()
            .any(|h| h.contains("query_tool_result")));
        assert!(report.retrieval_hints.iter().any(|h| h.contains("Large dataset")));
    }

    #[tokio::test]
    async fn metadata_accepts_bare_ids() {
        let (s, r) = store_with(5).await;
        let report = s.get_metadata(&r.id).await.unwrap();
        assert_eq!(report.reference_id, "ref_x");
    }

    #[tokio::test]
    async fn pagination_reports_counts_and_has_more() {
        let (s, r) = store_with(3000).await;
        let resp = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: None,
                    offset: Some(0),
                    limit: Some(100),
                },
            )
            .await
            .unwrap();
        match resp {
            QueryResponse::Page {
                returned_count,
                total_count,
                has_more,
                items,
                ..
            } => {
                assert_eq!(returned_count, 100);
                assert_eq!(total_count, 3000);
                assert!(has_more);
                assert_eq!(items[0], json!({"id": 0, "amount": 0}));
            }
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn final_page_has_no_more() {
        let (s, r) = store_with(10).await;
        let resp = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: None,
                    offset: Some(5),
                    limit: Some(100),
                },
            )
            .await
            .unwrap();
        match resp {
            QueryResponse::Page {
                returned_count,
                has_more,
                ..
            } => {
                assert_eq!(returned_count, 5);
                assert!(!has_more);
            }
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn offset_past_end_is_invalid_offset() {
        let (s, r) = store_with(10).await;
        let err = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: None,
                    offset: Some(10),
                    limit: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_offset");
    }

    #[tokio::test]
    async fn sql_over_json_array_converts_and_filters() {
        let (s, r) = store_with(50).await;
        let resp = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: Some("SELECT id FROM results WHERE amount >= 480".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        match resp {
            QueryResponse::Rows(rows) => {
                assert_eq!(rows.columns, vec!["id"]);
                assert_eq!(rows.rows, vec![vec![json!(48)], vec![json!(49)]]);
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sql_over_csv_converts_and_filters() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let r = s
            .store_bytes("csv_ref", b"name,total\nalice,5\nbob,50\n".to_vec(), None)
            .await
            .unwrap();
        let resp = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: Some("SELECT name FROM results WHERE CAST(total AS INTEGER) > 10".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        match resp {
            QueryResponse::Rows(rows) => assert_eq!(rows.rows, vec![vec![json!("bob")]]),
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sql_over_text_is_unsupported_type() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let r = s
            .store_bytes("txt", b"just some log output".to_vec(), None)
            .await
            .unwrap();
        let err = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: Some("SELECT * FROM results".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_type");
    }

    #[tokio::test]
    async fn zero_length_array_with_sql_yields_empty_relation() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let r = s.store_bytes("empty", b"[]".to_vec(), None).await.unwrap();
        let resp = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: Some("SELECT * FROM results".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        match resp {
            QueryResponse::Rows(rows) => {
                assert!(rows.columns.is_empty());
                assert!(rows.rows.is_empty());
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_length_array_pagination_is_empty_success() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let r = s.store_bytes("empty", b"[]".to_vec(), None).await.unwrap();
        let resp = s.query(&r.to_string(), QueryRequest::default()).await.unwrap();
        match resp {
            QueryResponse::Page {
                returned_count,
                total_count,
                has_more,
                ..
            } => {
                assert_eq!(returned_count, 0);
                assert_eq!(total_count, 0);
                assert!(!has_more);
            }
            other => panic!("expected a page, got {other:?}"),
        }
    }

    // ── SQL-native results ────────────────────────────────────────────────────

    #[tokio::test]
    async fn sql_result_round_trip() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let data = TableData {
            columns: vec!["n".into()],
            rows: vec![vec![json!(1)], vec![json!(2)]],
        };
        let r = s.store_sql_result("q1", data).await.unwrap();
        assert_eq!(r.location, StorageLocation::Database);

        let report = s.get_metadata(&r.to_string()).await.unwrap();
        assert_eq!(report.data_type, DataType::SqlResult);
        assert_eq!(report.schema.unwrap().item_count, 2);

        let resp = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: Some("SELECT SUM(n) AS total FROM results".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        match resp {
            QueryResponse::Rows(rows) => assert_eq!(rows.rows[0][0], json!(3)),
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sql_result_without_sql_paginates() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let data = TableData {
            columns: vec!["n".into()],
            rows: (0..30).map(|i| vec![json!(i)]).collect(),
        };
        let r = s.store_sql_result("q1", data).await.unwrap();
        let resp = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: None,
                    offset: Some(10),
                    limit: Some(5),
                },
            )
            .await
            .unwrap();
        match resp {
            QueryResponse::Page {
                items,
                returned_count,
                total_count,
                has_more,
                ..
            } => {
                assert_eq!(returned_count, 5);
                assert_eq!(total_count, 30);
                assert!(has_more);
                assert_eq!(items[0], json!({"n": 10}));
            }
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sql_store_disabled_is_store_not_available() {
        let s = LargeResultStore::without_sql(3600);
        let r = s.store_bytes("j", json_items(5), None).await.unwrap();
        let err = s
            .query(
                &r.to_string(),
                QueryRequest {
                    sql: Some("SELECT * FROM results".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store_not_available");
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let err = s.get_metadata("DataRef[ghost, MEMORY, 1]").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn small_outputs_stay_inline() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        match s.stash_if_large("short output", 1024).await.unwrap() {
            StashOutcome::Inline(text) => assert_eq!(text, "short output"),
            other => panic!("expected inline, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_outputs_are_stashed_behind_a_reference() {
        let s = LargeResultStore::in_memory(3600).unwrap();
        let big = String::from_utf8(json_items(500)).unwrap();
        let outcome = s.stash_if_large(&big, 256).await.unwrap();
        let StashOutcome::Stashed {
            reference,
            replacement,
        } = outcome
        else {
            panic!("expected a stash");
        };
        assert!(replacement.contains("DataRef["));
        assert!(replacement.contains("get_tool_result"));
        assert!(!replacement.contains(&big), "payload must not leak inline");
        // The reference resolves back to the full payload.
        let report = s.get_metadata(&reference.to_string()).await.unwrap();
        assert_eq!(report.schema.unwrap().item_count, 500);
    }

    #[tokio::test]
    async fn generated_reference_ids_are_unique_and_usable() {
        let a = new_reference_id();
        let b = new_reference_id();
        assert_ne!(a, b);
        assert!(a.starts_with("res_"));

        let s = LargeResultStore::in_memory(3600).unwrap();
        let r = s.store_bytes(&a, b"[]".to_vec(), None).await.unwrap();
        assert!(s.get_metadata(&r.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_sweeps_both_sub_stores() {
        let s = LargeResultStore::in_memory(0).unwrap();
        s.store_bytes("m", b"payload".to_vec(), None).await.unwrap();
        s.store_sql_result(
            "q",
            TableData {
                columns: vec!["a".into()],
                rows: vec![vec![json!(1)]],
            },
        )
        .await
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let (evicted, dropped) = s.cleanup_expired().await.unwrap();
        assert_eq!(evicted, 1);
        assert_eq!(dropped, 1);
    }
}
