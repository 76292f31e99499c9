// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use engram_model::TokenCounter;
use serde_json::Value;
use tracing::debug;

use crate::convert::{csv_to_table, looks_like_csv};
use crate::error::StoreError;
use crate::reference::StorageLocation;
use crate::result_types::{
    build_preview, build_text_preview, DataMetadata, DataType, SchemaDescriptor,
};

enum Payload {
    Heap(Vec<u8>),
    Spilled(PathBuf),
}

struct Entry {
    payload: Payload,
    metadata: DataMetadata,
}

/// Heap-backed store for oversize tool outputs, spilling payloads above a
/// size threshold into the `swap/` directory.
///
/// Writes of the same reference id are undefined per the concurrency
/// contract; callers generate unique ids.
pub struct MemoryResultStore {
    entries: Mutex<HashMap<String, Entry>>,
    swap_dir: Option<PathBuf>,
    spill_threshold_bytes: usize,
    ttl_secs: u64,
}

impl MemoryResultStore {
    pub fn new(swap_dir: Option<PathBuf>, spill_threshold_bytes: usize, ttl_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            swap_dir,
            spill_threshold_bytes,
            ttl_secs,
        }
    }

    /// Heap-only store (no spill directory); used by tests and deployments
    /// without a persistent state dir.
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self::new(None, usize::MAX, ttl_secs)
    }

    /// Store a payload, computing its metadata (type detection, schema,
    /// preview, token estimate).  Returns the metadata plus where the bytes
    /// ended up.
    pub async fn store(
        &self,
        id: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(DataMetadata, StorageLocation), StoreError> {
        let metadata = describe(&bytes, content_type, self.ttl_secs);

        let (payload, location) = if bytes.len() > self.spill_threshold_bytes {
            let Some(dir) = &self.swap_dir else {
                return Err(StoreError::StorageFailed(format!(
                    "payload of {} bytes exceeds the heap threshold and no swap directory \
                     is configured",
                    bytes.len()
                )));
            };
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::StorageFailed(e.to_string()))?;
            let path = dir.join(format!("{id}.bin"));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| StoreError::StorageFailed(e.to_string()))?;
            debug!(id = %id, path = %path.display(), "spilled large result to disk");
            (Payload::Spilled(path), StorageLocation::Disk)
        } else {
            (Payload::Heap(bytes), StorageLocation::Memory)
        };

        self.entries.lock().unwrap().insert(
            id.to_string(),
            Entry {
                payload,
                metadata: metadata.clone(),
            },
        );
        Ok((metadata, location))
    }

    /// Full payload bytes.  Expired entries behave as absent.
    pub async fn get_bytes(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let path = {
            let entries = self.entries.lock().unwrap();
            let entry = entries
                .get(id)
                .ok_or_else(|| StoreError::NotFound(format!("reference {id}")))?;
            if entry.metadata.is_expired(Utc::now()) {
                return Err(StoreError::NotFound(format!("reference {id} (expired)")));
            }
            match &entry.payload {
                Payload::Heap(bytes) => return Ok(bytes.clone()),
                Payload::Spilled(path) => path.clone(),
            }
        };
        tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::RetrievalFailed(format!("{}: {e}", path.display())))
    }

    pub fn metadata(&self, id: &str) -> Result<DataMetadata, StoreError> {
        let entries = self.entries.lock().unwrap();
        let entry = entries
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("reference {id}")))?;
        if entry.metadata.is_expired(Utc::now()) {
            return Err(StoreError::NotFound(format!("reference {id} (expired)")));
        }
        Ok(entry.metadata.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().unwrap().contains_key(id)
    }

    /// Evict every expired entry, deleting spilled files.  Returns the
    /// eviction count.  Eviction derives purely from metadata timestamps,
    /// so a crashed cleanup simply reruns.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let stale: Vec<(String, Option<PathBuf>)> = {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .filter(|(_, e)| e.metadata.is_expired(now))
                .map(|(id, e)| {
                    let path = match &e.payload {
                        Payload::Spilled(p) => Some(p.clone()),
                        Payload::Heap(_) => None,
                    };
                    (id.clone(), path)
                })
                .collect()
        };
        let count = stale.len();
        for (id, path) in stale {
            self.entries.lock().unwrap().remove(&id);
            if let Some(p) = path {
                let _ = tokio::fs::remove_file(&p).await;
            }
        }
        count
    }
}

/// Compute metadata for a raw payload: type detection, schema, preview.
fn describe(bytes: &[u8], content_type: Option<&str>, ttl_secs: u64) -> DataMetadata {
    let text = String::from_utf8_lossy(bytes);
    let estimated_tokens = TokenCounter.count_str(&text);

    // JSON array first (the dominant tool-output shape), then CSV, then text.
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text) {
        let columns = match items.first() {
            Some(Value::Object(map)) => {
                let mut cols: Vec<String> = map.keys().cloned().collect();
                cols.sort();
                cols
            }
            _ => Vec::new(),
        };
        return DataMetadata {
            content_type: content_type.unwrap_or("application/json").to_string(),
            data_type: DataType::JsonArray,
            size_bytes: bytes.len(),
            estimated_tokens,
            schema: Some(SchemaDescriptor {
                columns,
                item_count: items.len(),
            }),
            preview: build_preview(&items),
            created_at: Utc::now(),
            ttl_secs,
        };
    }

    if looks_like_csv(&text) {
        let schema = csv_to_table(&text).ok().map(|t| SchemaDescriptor {
            columns: t.columns.clone(),
            item_count: t.row_count(),
        });
        let lines: Vec<Value> = text.lines().map(|l| Value::String(l.to_string())).collect();
        return DataMetadata {
            content_type: content_type.unwrap_or("text/csv").to_string(),
            data_type: DataType::Csv,
            size_bytes: bytes.len(),
            estimated_tokens,
            schema,
            preview: build_preview(&lines),
            created_at: Utc::now(),
            ttl_secs,
        };
    }

    DataMetadata {
        content_type: content_type.unwrap_or("text/plain").to_string(),
        data_type: DataType::Text,
        size_bytes: bytes.len(),
        estimated_tokens,
        schema: None,
        preview: build_text_preview(&text),
        created_at: Utc::now(),
        ttl_secs,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
