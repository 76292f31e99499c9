// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable storage for the engram memory core: the session store (sessions,
//! messages, artifacts, memory snapshots, FTS index) and the large-result
//! store (progressive disclosure over oversize tool outputs).

mod convert;
mod error;
mod memory_results;
mod reference;
mod result_store;
mod result_types;
mod schema;
mod session_store;
mod sql_results;

pub use convert::{csv_to_table, json_array_to_table, looks_like_csv, TableData};
pub use error::StoreError;
pub use memory_results::MemoryResultStore;
pub use reference::{DataRef, StorageLocation};
pub use result_store::{
    new_reference_id, LargeResultStore, MetadataReport, QueryRequest, QueryResponse, StashOutcome,
};
pub use result_types::{
    build_preview, build_text_preview, retrieval_hints, DataMetadata, DataType, SchemaDescriptor,
    PREVIEW_BYTE_BUDGET,
};
pub use schema::{seed_v1_0_0, CURRENT_VERSION};
pub use session_store::{
    Artifact, MemorySnapshot, SearchHit, SessionRecord, SessionStore, StoredMessage, SystemStats,
};
pub use sql_results::{QueryRows, SqlResultMeta, SqlResultStore};
