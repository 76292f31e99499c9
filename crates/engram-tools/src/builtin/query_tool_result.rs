// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use engram_store::{LargeResultStore, QueryRequest};
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::json_data;
use crate::tool::{Tool, ToolContext, ToolResult};

/// Progressive disclosure step 2: fetch or filter a stored large result.
/// `offset`/`limit` paginates; `sql` filters server-side against the
/// virtual table `results` (JSON and CSV convert on demand).
pub struct QueryToolResultTool {
    pub results: Arc<LargeResultStore>,
}

#[async_trait]
impl Tool for QueryToolResultTool {
    fn name(&self) -> &str {
        "query_tool_result"
    }

    fn description(&self) -> &str {
        "Fetch or filter a stored large result. Use offset/limit to page through items, \
         or pass a SQL query referencing the table 'results' to filter server-side \
         (json_array and csv data is converted to a table on the fly)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reference_id": {
                    "type": "string",
                    "description": "The reference id, bare or as a DataRef[...] string"
                },
                "sql": {
                    "type": "string",
                    "description": "SQL query over the virtual table 'results'"
                },
                "offset": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Items to skip (pagination)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum items to return (default 100)"
                }
            },
            "required": ["reference_id"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let Some(reference) = input.get("reference_id").and_then(Value::as_str) else {
            return ToolResult::invalid_input("missing 'reference_id'");
        };
        let request = QueryRequest {
            sql: input
                .get("sql")
                .and_then(Value::as_str)
                .map(String::from),
            offset: input.get("offset").and_then(Value::as_u64).map(|v| v as usize),
            limit: input.get("limit").and_then(Value::as_u64).map(|v| v as usize),
        };
        debug!(reference = %reference, has_sql = request.sql.is_some(), "query_tool_result");
        match self.results.query(reference, request).await {
            Ok(response) => json_data(&response),
            Err(e) => ToolResult::err(e),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
