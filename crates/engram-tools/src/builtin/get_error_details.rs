// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use engram_core::{MemoryError, MemoryManager};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolContext, ToolResult};

/// Expose the session's failure history: live failure signatures with their
/// consecutive counts, plus the output-token breaker streak.
pub struct GetErrorDetailsTool {
    pub manager: Arc<MemoryManager>,
}

#[async_trait]
impl Tool for GetErrorDetailsTool {
    fn name(&self) -> &str {
        "get_error_details"
    }

    fn description(&self) -> &str {
        "Show the failure history of this session: which tool calls keep failing with \
         identical parameters, how often, and the current output-token truncation streak. \
         Optionally filter by tool name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {
                    "type": "string",
                    "description": "Only report failures of this tool"
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let session_id = match ctx.require_session() {
            Ok(id) => id,
            Err(e) => return ToolResult::err(e),
        };
        let Some(session) = self.manager.get_session(session_id).await else {
            return ToolResult::err(MemoryError::SessionNotFound(session_id.to_string()));
        };
        let filter = input.get("tool_name").and_then(Value::as_str);

        let (signatures, streak) = {
            let failures = session.failures.lock().unwrap();
            (failures.snapshot(), failures.output_token_streak())
        };
        let rendered: Vec<Value> = signatures
            .iter()
            .filter(|(sig, _)| filter.is_none_or(|f| sig.tool_name == f))
            .map(|(sig, count)| {
                json!({
                    "tool_name": sig.tool_name,
                    "params": sig.params,
                    "error_type": sig.error_type,
                    "consecutive_count": count,
                })
            })
            .collect();

        ToolResult::ok(json!({
            "failures": rendered,
            "output_token_streak": streak,
        }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use engram_config::Config;
    use engram_store::SessionStore;
    use serde_json::json;

    use super::*;

    async fn setup() -> (GetErrorDetailsTool, ToolContext) {
        let store = Arc::new(SessionStore::open_in_memory().await.unwrap());
        let manager = Arc::new(MemoryManager::new(&Config::default()).with_store(store));
        let session = manager.get_or_create_session("s1", None, None).await.unwrap();
        {
            let mut failures = session.failures.lock().unwrap();
            failures.record("query_tool_result", &json!({"sql": "x"}), "query_failed");
            failures.record("query_tool_result", &json!({"sql": "x"}), "query_failed");
            failures.record("read_file", &json!({"path": "/a"}), "not_found");
        }
        (GetErrorDetailsTool { manager }, ToolContext::for_session("s1"))
    }

    #[tokio::test]
    async fn reports_signatures_with_counts() {
        let (tool, ctx) = setup().await;
        let out = tool.execute(&ctx, json!({})).await;
        assert!(out.success);
        let failures = out.data["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures
            .iter()
            .any(|f| f["tool_name"] == json!("query_tool_result")
                && f["consecutive_count"] == json!(2)));
        assert_eq!(out.data["output_token_streak"], json!(0));
    }

    #[tokio::test]
    async fn tool_name_filter_narrows_output() {
        let (tool, ctx) = setup().await;
        let out = tool.execute(&ctx, json!({"tool_name": "read_file"})).await;
        let failures = out.data["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["tool_name"], json!("read_file"));
    }

    #[tokio::test]
    async fn missing_session_id_is_contract_error() {
        let (tool, _) = setup().await;
        let out = tool.execute(&ToolContext::default(), json!({})).await;
        assert_eq!(out.error_code(), Some("MISSING_SESSION_ID"));
    }
}
