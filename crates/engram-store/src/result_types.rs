// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on a serialized preview (progressive-disclosure invariant).
pub const PREVIEW_BYTE_BUDGET: usize = 2048;

/// Items above this count earn a "large dataset" warning in the hints.
const LARGE_DATASET_ITEMS: usize = 1000;

/// Shape of a stored payload.  A closed sum; routing never dispatches on
/// raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    JsonArray,
    Csv,
    Text,
    SqlResult,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::JsonArray => write!(f, "json_array"),
            DataType::Csv => write!(f, "csv"),
            DataType::Text => write!(f, "text"),
            DataType::SqlResult => write!(f, "sql_result"),
        }
    }
}

/// Relational shape of a converted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub columns: Vec<String>,
    pub item_count: usize,
}

/// Everything the first (metadata-only) disclosure step reveals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMetadata {
    pub content_type: String,
    pub data_type: DataType,
    pub size_bytes: usize,
    pub estimated_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDescriptor>,
    /// First 5 + last 5 items (or a head slice for text), ≤ 2 KB serialized
    pub preview: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl DataMetadata {
    /// True once `created_at + ttl` has passed.  Purely derivable from the
    /// metadata row, so cleanup survives crashes.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.created_at + chrono::Duration::seconds(self.ttl_secs as i64);
        now > deadline
    }
}

/// Build the standard first-5 + last-5 preview.
///
/// Fewer than ten items previews everything.  When the serialized preview
/// exceeds [`PREVIEW_BYTE_BUDGET`], each item is collapsed to a truncated
/// string rendering so the item COUNT is preserved while the bytes shrink.
pub fn build_preview(items: &[Value]) -> Value {
    let selected: Vec<Value> = if items.len() <= 10 {
        items.to_vec()
    } else {
        items[..5]
            .iter()
            .chain(items[items.len() - 5..].iter())
            .cloned()
            .collect()
    };

    let serialized = Value::Array(selected.clone());
    if serialized.to_string().len() <= PREVIEW_BYTE_BUDGET {
        return serialized;
    }

    let per_item = PREVIEW_BYTE_BUDGET / selected.len().max(1);
    Value::Array(
        selected
            .iter()
            .map(|item| {
                let mut s = item.to_string();
                s.truncate(per_item.saturating_sub(2).max(8));
                Value::String(s)
            })
            .collect(),
    )
}

/// Head-of-text preview bounded by the byte budget (cut at a char boundary).
pub fn build_text_preview(text: &str) -> Value {
    let mut end = text.len().min(PREVIEW_BYTE_BUDGET);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    Value::String(text[..end].to_string())
}

/// Deterministic retrieval hints for the metadata disclosure step.
pub fn retrieval_hints(data_type: DataType, item_count: usize) -> Vec<String> {
    let mut hints = vec![match data_type {
        DataType::JsonArray => {
            "Use query_tool_result with offset/limit to page through items, or pass a SQL \
             query (FROM results) to filter server-side."
                .to_string()
        }
        DataType::SqlResult => {
            "Use query_tool_result with a SQL query; reference the data as the table 'results'."
                .to_string()
        }
        DataType::Csv => {
            "Use query_tool_result with a SQL query (FROM results); the CSV is converted to \
             a table on demand."
                .to_string()
        }
        DataType::Text => {
            "This is plain text; fetch slices with query_tool_result offset/limit and filter \
             externally."
                .to_string()
        }
    }];
    if item_count > LARGE_DATASET_ITEMS {
        hints.push(format!(
            "Large dataset ({item_count} items); prefer SQL filtering over full pagination."
        ));
    }
    hints
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn items(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"id": i})).collect()
    }

    // ── Preview ───────────────────────────────────────────────────────────────

    #[test]
    fn preview_of_large_array_is_exactly_ten_items() {
        let p = build_preview(&items(3000));
        assert_eq!(p.as_array().unwrap().len(), 10);
    }

    #[test]
    fn preview_takes_first_five_and_last_five() {
        let p = build_preview(&items(100));
        let arr = p.as_array().unwrap();
        assert_eq!(arr[0], json!({"id": 0}));
        assert_eq!(arr[4], json!({"id": 4}));
        assert_eq!(arr[5], json!({"id": 95}));
        assert_eq!(arr[9], json!({"id": 99}));
    }

    #[test]
    fn preview_of_small_array_keeps_everything() {
        let p = build_preview(&items(3));
        assert_eq!(p.as_array().unwrap().len(), 3);
    }

    #[test]
    fn preview_stays_under_byte_budget_for_fat_items() {
        let fat: Vec<Value> = (0..20)
            .map(|i| json!({"id": i, "blob": "x".repeat(4000)}))
            .collect();
        let p = build_preview(&fat);
        assert_eq!(p.as_array().unwrap().len(), 10, "item count must survive");
        assert!(
            p.to_string().len() <= PREVIEW_BYTE_BUDGET + 256,
            "serialized preview must stay near the 2 KB budget"
        );
    }

    #[test]
    fn text_preview_is_bounded() {
        let p = build_text_preview(&"y".repeat(100_000));
        assert_eq!(p.as_str().unwrap().len(), PREVIEW_BYTE_BUDGET);
    }

    #[test]
    fn text_preview_respects_char_boundaries() {
        let text = "é".repeat(PREVIEW_BYTE_BUDGET); // 2 bytes per char
        let p = build_text_preview(&text);
        assert!(p.as_str().unwrap().len() <= PREVIEW_BYTE_BUDGET);
    }

    // ── Hints ─────────────────────────────────────────────────────────────────

    #[test]
    fn json_array_hint_mentions_query_tool_result() {
        let hints = retrieval_hints(DataType::JsonArray, 10);
        assert!(hints[0].contains("query_tool_result"));
    }

    #[test]
    fn sql_result_hint_names_the_results_table() {
        let hints = retrieval_hints(DataType::SqlResult, 10);
        assert!(hints[0].contains("results"));
    }

    #[test]
    fn csv_hint_suggests_sql() {
        let hints = retrieval_hints(DataType::Csv, 10);
        assert!(hints[0].contains("SQL"));
    }

    #[test]
    fn text_hint_suggests_external_filtering() {
        let hints = retrieval_hints(DataType::Text, 0);
        assert!(hints[0].contains("externally"));
    }

    #[test]
    fn large_dataset_earns_a_warning() {
        let hints = retrieval_hints(DataType::JsonArray, 3000);
        assert_eq!(hints.len(), 2);
        assert!(hints[1].contains("Large dataset"));
        assert!(hints[1].contains("3000"));
    }

    #[test]
    fn small_dataset_has_no_warning() {
        assert_eq!(retrieval_hints(DataType::JsonArray, 1000).len(), 1);
    }

    // ── Expiry ────────────────────────────────────────────────────────────────

    #[test]
    fn metadata_expiry_is_derivable_from_timestamps() {
        let meta = DataMetadata {
            content_type: "application/json".into(),
            data_type: DataType::JsonArray,
            size_bytes: 10,
            estimated_tokens: 3,
            schema: None,
            preview: json!([]),
            created_at: Utc::now() - chrono::Duration::seconds(120),
            ttl_secs: 60,
        };
        assert!(meta.is_expired(Utc::now()));
        let fresh = DataMetadata {
            created_at: Utc::now(),
            ..meta
        };
        assert!(!fresh.is_expired(Utc::now()));
    }

    #[test]
    fn data_type_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&DataType::JsonArray).unwrap(),
            "\"json_array\""
        );
        assert_eq!(
            serde_json::to_string(&DataType::SqlResult).unwrap(),
            "\"sql_result\""
        );
    }
}
