// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
/// Store-layer errors.
///
/// The `kind()` string of each variant is part of the tool contract; it is
/// what the model sees inside a failed tool result, so the exact spellings
/// are load-bearing and covered by tests.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("offset out of range: {0}")]
    InvalidOffset(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store not available: {0}")]
    StoreNotAvailable(String),
    #[error("unsupported data type: {0}")]
    UnsupportedType(String),
    #[error("conversion failed: {0}")]
    ConversionFailed(String),
    #[error("query failed: {message}")]
    QueryFailed {
        message: String,
        /// Machine-readable hint (e.g. the known column list)
        suggestion: Option<String>,
    },
    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),
    #[error("storage failed: {0}")]
    StorageFailed(String),
    #[error("metadata failed: {0}")]
    MetadataFailed(String),
    #[error("migration failed at {version}: {message}")]
    Migration { version: i64, message: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Join(String),
}

impl StoreError {
    /// The wire-visible error code for tool results.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::InvalidInput(_) => "invalid_input",
            StoreError::InvalidOffset(_) => "invalid_offset",
            StoreError::NotFound(_) => "not_found",
            StoreError::StoreNotAvailable(_) => "store_not_available",
            StoreError::UnsupportedType(_) => "unsupported_type",
            StoreError::ConversionFailed(_) => "conversion_failed",
            StoreError::QueryFailed { .. } => "query_failed",
            StoreError::RetrievalFailed(_) => "retrieval_failed",
            StoreError::StorageFailed(_) => "storage_failed",
            StoreError::MetadataFailed(_) => "metadata_failed",
            StoreError::Migration { .. } | StoreError::Sqlite(_) | StoreError::Join(_) => {
                "storage_failed"
            }
            StoreError::Io(_) => "storage_failed",
        }
    }

    /// Machine-readable suggestion attached to some failures.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            StoreError::QueryFailed { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
