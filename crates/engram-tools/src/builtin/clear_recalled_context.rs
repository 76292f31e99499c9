// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use engram_core::MemoryManager;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolContext, ToolResult};

/// Empty the promoted-context slot, releasing the budget it consumed.
pub struct ClearRecalledContextTool {
    pub manager: Arc<MemoryManager>,
}

#[async_trait]
impl Tool for ClearRecalledContextTool {
    fn name(&self) -> &str {
        "clear_recalled_context"
    }

    fn description(&self) -> &str {
        "Remove every message previously promoted into the live context by \
         search_conversation or recall_conversation."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> ToolResult {
        let session_id = match ctx.require_session() {
            Ok(id) => id,
            Err(e) => return ToolResult::err(e),
        };
        match self.manager.clear_recalled_context(session_id).await {
            Ok(cleared) => ToolResult::ok(json!({ "cleared_messages": cleared })),
            Err(e) => ToolResult::err(e),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
