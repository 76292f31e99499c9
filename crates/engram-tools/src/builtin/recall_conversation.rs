// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use engram_core::MemoryManager;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolContext, ToolResult};

const DEFAULT_LIMIT: usize = 10;

/// Pull an exact offset/limit slice of the archived conversation back into
/// the live context.
pub struct RecallConversationTool {
    pub manager: Arc<MemoryManager>,
}

#[async_trait]
impl Tool for RecallConversationTool {
    fn name(&self) -> &str {
        "recall_conversation"
    }

    fn description(&self) -> &str {
        "Recall a slice of the archived conversation by position (offset/limit from the \
         start of the session) and promote it into the live context. Budget-checked; \
         use clear_recalled_context to release it again."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "offset": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Messages to skip from the start (default 0)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum messages to recall (default 10)"
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let session_id = match ctx.require_session() {
            Ok(id) => id,
            Err(e) => return ToolResult::err(e),
        };
        let offset = input
            .get("offset")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(0);
        let limit = input
            .get("limit")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT);
        debug!(session_id = %session_id, offset, limit, "recall_conversation");

        match self
            .manager
            .recall_conversation(session_id, offset, limit)
            .await
        {
            Ok(messages) => {
                let rendered: Vec<Value> = messages
                    .iter()
                    .map(|m| {
                        json!({
                            "role": m.role,
                            "content": m.content,
                            "timestamp": m.timestamp,
                        })
                    })
                    .collect();
                ToolResult::ok(json!({
                    "messages": rendered,
                    "returned_count": rendered.len(),
                    "offset": offset,
                }))
            }
            Err(e) => ToolResult::err(e),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
