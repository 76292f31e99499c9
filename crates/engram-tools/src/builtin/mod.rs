// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The built-in memory tools: thin adapters over the store and the memory
//! engine.  Each tool returns the wire-contract error codes verbatim and
//! never panics on malformed input.

mod clear_recalled_context;
mod get_error_details;
mod get_tool_result;
mod query_tool_result;
mod recall_conversation;
mod search_conversation;
mod session_memory;

use std::sync::Arc;

pub use clear_recalled_context::ClearRecalledContextTool;
use engram_core::MemoryManager;
use engram_store::LargeResultStore;
pub use get_error_details::GetErrorDetailsTool;
pub use get_tool_result::GetToolResultTool;
pub use query_tool_result::QueryToolResultTool;
pub use recall_conversation::RecallConversationTool;
pub use search_conversation::SearchConversationTool;
pub use session_memory::SessionMemoryTool;

use crate::registry::ToolRegistry;
use crate::tool::{ToolError, ToolResult};

/// Registry pre-loaded with every built-in memory tool.
pub fn standard_registry(
    manager: Arc<MemoryManager>,
    results: Arc<LargeResultStore>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(GetToolResultTool {
        results: results.clone(),
    });
    registry.register(QueryToolResultTool { results });
    registry.register(SearchConversationTool {
        manager: manager.clone(),
    });
    registry.register(RecallConversationTool {
        manager: manager.clone(),
    });
    registry.register(ClearRecalledContextTool {
        manager: manager.clone(),
    });
    registry.register(GetErrorDetailsTool {
        manager: manager.clone(),
    });
    registry.register(SessionMemoryTool { manager });
    registry
}

/// Serialize a payload into the result body, downgrading serializer faults
/// to a `metadata_failed` result instead of panicking.
pub(crate) fn json_data<T: serde::Serialize>(value: &T) -> ToolResult {
    match serde_json::to_value(value) {
        Ok(v) => ToolResult::ok(v),
        Err(e) => ToolResult::err(ToolError {
            code: "metadata_failed".into(),
            message: format!("failed to serialize tool output: {e}"),
            suggestion: None,
        }),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use engram_config::Config;
    use engram_store::SessionStore;

    use super::*;

    #[tokio::test]
    async fn standard_registry_exposes_the_full_tool_surface() {
        let store = Arc::new(SessionStore::open_in_memory().await.unwrap());
        let manager = Arc::new(MemoryManager::new(&Config::default()).with_store(store));
        let results = Arc::new(LargeResultStore::in_memory(3600).unwrap());
        let registry = standard_registry(manager, results);
        assert_eq!(
            registry.names(),
            vec![
                "clear_recalled_context",
                "get_error_details",
                "get_tool_result",
                "query_tool_result",
                "recall_conversation",
                "search_conversation",
                "session_memory",
            ]
        );
    }
}
