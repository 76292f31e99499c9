// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use engram_store::LargeResultStore;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::json_data;
use crate::tool::{Tool, ToolContext, ToolResult};

/// Progressive disclosure step 1: metadata, schema, preview, and retrieval
/// hints for a stored large result.  Never returns the payload itself.
pub struct GetToolResultTool {
    pub results: Arc<LargeResultStore>,
}

#[async_trait]
impl Tool for GetToolResultTool {
    fn name(&self) -> &str {
        "get_tool_result"
    }

    fn description(&self) -> &str {
        "Inspect a stored large result by reference id. Returns its data type, size, \
         schema, a small preview, and hints for retrieving the data; never the full \
         payload. Follow up with query_tool_result to fetch or filter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reference_id": {
                    "type": "string",
                    "description": "The reference id, bare or as a DataRef[...] string"
                }
            },
            "required": ["reference_id"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let Some(reference) = input.get("reference_id").and_then(Value::as_str) else {
            return ToolResult::invalid_input("missing 'reference_id'");
        };
        debug!(reference = %reference, "get_tool_result");
        match self.results.get_metadata(reference).await {
            Ok(report) => json_data(&report),
            Err(e) => ToolResult::err(e),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
