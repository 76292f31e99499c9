// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use engram_core::MemoryManager;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolContext, ToolResult};

const DEFAULT_LIMIT: usize = 5;

/// Semantic recall over the session archive: BM25 candidates, optional LLM
/// re-ranking, and (with `promote`) budget-checked promotion into the live
/// prompt.
pub struct SearchConversationTool {
    pub manager: Arc<MemoryManager>,
}

#[async_trait]
impl Tool for SearchConversationTool {
    fn name(&self) -> &str {
        "search_conversation"
    }

    fn description(&self) -> &str {
        "Search the archived conversation history by content. With promote=true the best \
         hits are pulled back into the live context (fails with token_budget_exceeded \
         when they do not fit)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Full-text search query"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum hits to return (default 5)"
                },
                "promote": {
                    "type": "boolean",
                    "description": "Pull the hits into the live context (default false)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let session_id = match ctx.require_session() {
            Ok(id) => id,
            Err(e) => return ToolResult::err(e),
        };
        let Some(query) = input.get("query").and_then(Value::as_str) else {
            return ToolResult::invalid_input("missing 'query'");
        };
        let limit = input
            .get("limit")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT);
        let promote = input
            .get("promote")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        debug!(session_id = %session_id, %query, limit, promote, "search_conversation");

        match self
            .manager
            .search_conversation(session_id, query, limit, promote)
            .await
        {
            Ok(hits) => {
                let results: Vec<Value> = hits
                    .iter()
                    .map(|h| {
                        json!({
                            "message_id": h.message_id,
                            "role": h.message.role,
                            "content": h.message.content,
                            "score": h.score,
                        })
                    })
                    .collect();
                ToolResult::ok(json!({
                    "results": results,
                    "count": results.len(),
                    "promoted": promote && !results.is_empty(),
                }))
            }
            Err(e) => ToolResult::err(e),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use engram_config::{BudgetConfig, Config};
    use engram_model::Message;
    use engram_store::SessionStore;
    use serde_json::json;

    use super::*;

    async fn setup(budget: Option<BudgetConfig>) -> (SearchConversationTool, ToolContext) {
        let store = Arc::new(SessionStore::open_in_memory().await.unwrap());
        let mut config = Config::default();
        if let Some(b) = budget {
            config.budget = b;
        }
        let manager = Arc::new(MemoryManager::new(&config).with_store(store));
        manager
            .get_or_create_session("s1", None, None)
            .await
            .unwrap();
        for i in 0..20 {
            manager
                .add_message("s1", Message::user(format!("release checklist item {i}")))
                .await
                .unwrap();
        }
        (
            SearchConversationTool { manager },
            ToolContext::for_session("s1"),
        )
    }

    #[tokio::test]
    async fn finds_and_scores_hits() {
        let (tool, ctx) = setup(None).await;
        let out = tool
            .execute(&ctx, json!({"query": "checklist", "limit": 3}))
            .await;
        assert!(out.success, "{:?}", out.error);
        assert_eq!(out.data["count"], json!(3));
        assert!(out.data["results"][0]["content"]
            .as_str()
            .unwrap()
            .contains("checklist"));
    }

    #[tokio::test]
    async fn missing_session_id_is_contract_error() {
        let (tool, _) = setup(None).await;
        let out = tool
            .execute(&ToolContext::default(), json!({"query": "x"}))
            .await;
        assert_eq!(out.error_code(), Some("MISSING_SESSION_ID"));
    }

    #[tokio::test]
    async fn missing_query_is_invalid_input() {
        let (tool, ctx) = setup(None).await;
        let out = tool.execute(&ctx, json!({})).await;
        assert_eq!(out.error_code(), Some("invalid_input"));
    }

    #[tokio::test]
    async fn oversized_promotion_surfaces_budget_error() {
        let (tool, ctx) = setup(Some(BudgetConfig {
            max_context_tokens: 120,
            reserved_output_tokens: Some(40),
        }))
        .await;
        let out = tool
            .execute(&ctx, json!({"query": "checklist", "limit": 50, "promote": true}))
            .await;
        assert_eq!(out.error_code(), Some("token_budget_exceeded"));
    }
}
