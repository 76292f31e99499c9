// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use engram_core::{MemoryError, MemoryManager};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolContext, ToolResult};

/// Inspect and steer the session's segmented memory: tier sizes, budget
/// pressure, swap counters, and a forced compaction action.
pub struct SessionMemoryTool {
    pub manager: Arc<MemoryManager>,
}

#[async_trait]
impl Tool for SessionMemoryTool {
    fn name(&self) -> &str {
        "session_memory"
    }

    fn description(&self) -> &str {
        "Inspect this session's memory state (action=stats): hot-tier size, summary size, \
         promoted context, budget usage, and compression counters. action=compact forces \
         a compression pass immediately."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["stats", "compact"],
                    "description": "What to do (default stats)"
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
        let action = input
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("stats");

        match action {
            "stats" => {
                let memory = session.memory.lock().await;
                let stats = memory.swap_stats();
                ToolResult::ok(json!({
                    "l1_messages": memory.l1_len(),
                    "l2_tokens": memory.l2_tokens(),
                    "promoted_messages": memory.promoted_len(),
                    "prompt_tokens": memory.prompt_tokens(),
                    "budget_pct": memory.budget_pct(),
                    "workload_profile": memory.profile().workload.to_string(),
                    "swap_enabled": memory.has_swap(),
                    "compactions": stats.compactions,
                    "messages_compressed": stats.messages_compressed,
                    "tokens_saved": stats.tokens_saved,
                    "l2_evictions": stats.l2_evictions,
                }))
            }
            "compact" => {
                let mut memory = session.memory.lock().await;
                match memory.compact(true).await {
                    Ok(report) => ToolResult::ok(json!({
                        "messages_compressed": report.messages_compressed,
                        "tokens_saved": report.tokens_saved,
                        "l1_messages": memory.l1_len(),
                        "l2_tokens": memory.l2_tokens(),
                    })),
                    Err(e) => ToolResult::err(e),
                }
            }
            other => ToolResult::invalid_input(format!("unknown action: {other}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use engram_config::Config;
    use engram_model::Message;
    use engram_store::SessionStore;
    use serde_json::json;

    use super::*;

    async fn setup() -> (SessionMemoryTool, ToolContext) {
        let store = Arc::new(SessionStore::open_in_memory().await.unwrap());
        let manager = Arc::new(MemoryManager::new(&Config::default()).with_store(store));
        manager.get_or_create_session("s1", None, None).await.unwrap();
        for i in 0..8 {
            manager
                .add_message("s1", Message::user(format!("note {i}")))
                .await
                .unwrap();
        }
        (SessionMemoryTool { manager }, ToolContext::for_session("s1"))
    }

    #[tokio::test]
    async fn stats_reports_tier_sizes_and_budget() {
        let (tool, ctx) = setup().await;
        let out = tool.execute(&ctx, json!({})).await;
        assert!(out.success);
        assert_eq!(out.data["l1_messages"], json!(8));
        assert_eq!(out.data["promoted_messages"], json!(0));
        assert!(out.data["budget_pct"].as_f64().unwrap() >= 0.0);
        assert_eq!(out.data["swap_enabled"], json!(true));
    }

    #[tokio::test]
    async fn compact_action_forces_a_pass() {
        let (tool, ctx) = setup().await;
        let out = tool.execute(&ctx, json!({"action": "compact"})).await;
        assert!(out.success, "{:?}", out.error);
        assert!(out.data["messages_compressed"].as_u64().unwrap() > 0);
        assert!(out.data["l1_messages"].as_u64().unwrap() < 8);
    }

    #[tokio::test]
    async fn unknown_action_is_invalid_input() {
        let (tool, ctx) = setup().await;
        let out = tool.execute(&ctx, json!({"action": "defrag"})).await;
        assert_eq!(out.error_code(), Some("invalid_input"));
    }
}
