// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! On-the-fly conversion of JSON arrays and CSV text into relational form.

use serde_json::Value;

use crate::error::StoreError;

/// Column-ordered relational data ready to materialize as a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Convert a JSON array of objects into rows.
///
/// Columns are the top-level keys of the FIRST item, sorted lexicographically
/// so the table shape is deterministic.  Nested maps and arrays re-serialize
/// to JSON strings; nulls and keys missing from later items become SQL nulls.
/// A zero-length array yields empty columns + rows (success, not an error).
pub fn json_array_to_table(items: &[Value]) -> Result<TableData, StoreError> {
    let Some(first) = items.first() else {
        return Ok(TableData {
            columns: Vec::new(),
            rows: Vec::new(),
        });
    };
    let Value::Object(first_map) = first else {
        return Err(StoreError::ConversionFailed(
            "first array item is not an object; cannot derive columns".into(),
        ));
    };

    let mut columns: Vec<String> = first_map.keys().cloned().collect();
    columns.sort();

    let rows = items
        .iter()
        .map(|item| {
            let obj = item.as_object();
            columns
                .iter()
                .map(|col| match obj.and_then(|m| m.get(col)) {
                    None | Some(Value::Null) => Value::Null,
                    Some(v @ (Value::Object(_) | Value::Array(_))) => {
                        Value::String(v.to_string())
                    }
                    Some(v) => v.clone(),
                })
                .collect()
        })
        .collect();

    Ok(TableData { columns, rows })
}

/// Convert CSV text into rows.
///
/// The first line is the header, comma-split with whitespace trimmed;
/// subsequent non-empty lines are values.  Short rows pad with nulls and
/// long rows truncate to the header width.  Fewer than two lines (header
/// alone, or nothing) is a conversion failure.
pub fn csv_to_table(text: &str) -> Result<TableData, StoreError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Err(StoreError::ConversionFailed("empty CSV input".into()));
    };
    let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();

    let rows: Vec<Vec<Value>> = lines
        .map(|line| {
            let mut values: Vec<Value> = line
                .split(',')
                .map(|v| Value::String(v.trim().to_string()))
                .collect();
            values.resize(columns.len(), Value::Null);
            values.truncate(columns.len());
            values
        })
        .collect();

    if rows.is_empty() {
        return Err(StoreError::ConversionFailed(
            "CSV has a header but no data rows".into(),
        ));
    }

    Ok(TableData { columns, rows })
}

/// Heuristic used when callers store raw bytes without declaring a type:
/// does the text look like CSV?  Requires a multi-column header and at
/// least one data row with the same comma count.
pub fn looks_like_csv(text: &str) -> bool {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let (Some(header), Some(first_row)) = (lines.next(), lines.next()) else {
        return false;
    };
    let cols = header.matches(',').count();
    cols >= 1 && first_row.matches(',').count() == cols
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // ── JSON arrays ───────────────────────────────────────────────────────────

    #[test]
    fn json_columns_are_sorted_first_item_keys() {
        let items = vec![json!({"zeta": 1, "alpha": 2, "mid": 3})];
        let t = json_array_to_table(&items).unwrap();
        assert_eq!(t.columns, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn json_rows_follow_column_order() {
        let items = vec![json!({"b": 2, "a": 1}), json!({"a": 10, "b": 20})];
        let t = json_array_to_table(&items).unwrap();
        assert_eq!(t.rows[0], vec![json!(1), json!(2)]);
        assert_eq!(t.rows[1], vec![json!(10), json!(20)]);
    }

    #[test]
    fn json_nested_values_serialise_to_strings() {
        let items = vec![json!({"id": 1, "tags": ["a", "b"], "meta": {"k": "v"}})];
        let t = json_array_to_table(&items).unwrap();
        // columns: id, meta, tags
        assert_eq!(t.rows[0][1], json!("{\"k\":\"v\"}"));
        assert_eq!(t.rows[0][2], json!("[\"a\",\"b\"]"));
    }

    #[test]
    fn json_missing_keys_become_nulls() {
        let items = vec![json!({"a": 1, "b": 2}), json!({"a": 3})];
        let t = json_array_to_table(&items).unwrap();
        assert_eq!(t.rows[1], vec![json!(3), Value::Null]);
    }

    #[test]
    fn json_explicit_nulls_stay_null() {
        let items = vec![json!({"a": null})];
        let t = json_array_to_table(&items).unwrap();
        assert_eq!(t.rows[0], vec![Value::Null]);
    }

    #[test]
    fn json_empty_array_yields_empty_table() {
        let t = json_array_to_table(&[]).unwrap();
        assert!(t.columns.is_empty());
        assert!(t.rows.is_empty());
    }

    #[test]
    fn json_scalar_first_item_fails_conversion() {
        let err = json_array_to_table(&[json!(42)]).unwrap_err();
        assert_eq!(err.kind(), "conversion_failed");
    }

    #[test]
    fn json_round_trip_preserves_rows_under_set_semantics() {
        let items = vec![
            json!({"name": "a", "n": 1}),
            json!({"name": "b", "n": 2}),
        ];
        let t = json_array_to_table(&items).unwrap();
        // Rebuild objects from (sorted) columns and compare as sets.
        let rebuilt: Vec<Value> = t
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (c, v) in t.columns.iter().zip(row) {
                    obj.insert(c.clone(), v.clone());
                }
                Value::Object(obj)
            })
            .collect();
        for item in &items {
            assert!(rebuilt.contains(item));
        }
    }

    // ── CSV ───────────────────────────────────────────────────────────────────

    #[test]
    fn csv_header_is_comma_split_and_trimmed() {
        let t = csv_to_table("id , name ,总额\n1,alice,9\n").unwrap();
        assert_eq!(t.columns, vec!["id", "name", "总额"]);
    }

    #[test]
    fn csv_values_are_trimmed_strings() {
        let t = csv_to_table("a,b\n 1 , x \n").unwrap();
        assert_eq!(t.rows[0], vec![json!("1"), json!("x")]);
    }

    #[test]
    fn csv_blank_lines_are_skipped() {
        let t = csv_to_table("a,b\n\n1,2\n\n3,4\n").unwrap();
        assert_eq!(t.row_count(), 2);
    }

    #[test]
    fn csv_short_rows_pad_with_nulls() {
        let t = csv_to_table("a,b,c\n1,2\n").unwrap();
        assert_eq!(t.rows[0], vec![json!("1"), json!("2"), Value::Null]);
    }

    #[test]
    fn csv_header_only_fails_conversion() {
        let err = csv_to_table("a,b,c\n").unwrap_err();
        assert_eq!(err.kind(), "conversion_failed");
    }

    #[test]
    fn csv_empty_input_fails_conversion() {
        assert!(csv_to_table("").is_err());
    }

    // ── CSV detection ─────────────────────────────────────────────────────────

    #[test]
    fn detects_simple_csv() {
        assert!(looks_like_csv("a,b\n1,2\n"));
    }

    #[test]
    fn plain_prose_is_not_csv() {
        assert!(!looks_like_csv("just a line of text\nand another\n"));
    }

    #[test]
    fn single_line_is_not_csv() {
        assert!(!looks_like_csv("a,b,c\n"));
    }
}
