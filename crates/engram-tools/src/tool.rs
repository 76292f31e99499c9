// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use engram_core::MemoryError;
use engram_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ambient values a tool call executes under.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

impl ToolContext {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            agent_id: None,
        }
    }

    /// The session id, or the `MISSING_SESSION_ID` contract error.
    pub fn require_session(&self) -> Result<&str, ToolError> {
        self.session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError {
                code: "MISSING_SESSION_ID".into(),
                message: "this tool requires a session id in the call context".into(),
                suggestion: None,
            })
    }

    /// The agent id, or the `MISSING_AGENT_ID` contract error.
    pub fn require_agent(&self) -> Result<&str, ToolError> {
        self.agent_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError {
                code: "MISSING_AGENT_ID".into(),
                message: "this tool requires an agent id in the call context".into(),
                suggestion: None,
            })
    }
}

/// Machine-readable error carried inside a failed tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<MemoryError> for ToolError {
    fn from(e: MemoryError) -> Self {
        Self {
            code: e.kind().to_string(),
            suggestion: e.suggestion().map(String::from),
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ToolError {
    fn from(e: StoreError) -> Self {
        Self {
            code: e.kind().to_string(),
            suggestion: e.suggestion().map(String::from),
            message: e.to_string(),
        }
    }
}

/// The result of executing a tool.
///
/// Failures are data, not panics: the agent loop feeds `error` back to the
/// model, so `code` spellings follow the wire contract exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    /// Filled in by the registry around `execute`.
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: Value::Null,
            execution_time_ms: 0,
        }
    }

    pub fn err(error: impl Into<ToolError>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            metadata: Value::Null,
            execution_time_ms: 0,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::err(ToolError {
            code: "invalid_input".into(),
            message: message.into(),
            suggestion: None,
        })
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

/// Progress events emitted while a tool call runs.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    /// Keepalive tick; `progress = -1.0` means indeterminate.
    Progress { call_id: String, progress: f64 },
}

/// The contract every memory tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the input object
    fn parameters_schema(&self) -> Value;
    /// Backend tag; empty means backend-agnostic.
    fn backend(&self) -> &str {
        ""
    }
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_session_id_uses_contract_spelling() {
        let ctx = ToolContext::default();
        let err = ctx.require_session().unwrap_err();
        assert_eq!(err.code, "MISSING_SESSION_ID");
    }

    #[test]
    fn empty_session_id_counts_as_missing() {
        let ctx = ToolContext {
            session_id: Some(String::new()),
            agent_id: None,
        };
        assert!(ctx.require_session().is_err());
    }

    #[test]
    fn missing_agent_id_uses_contract_spelling() {
        let ctx = ToolContext::for_session("s1");
        assert_eq!(ctx.require_agent().unwrap_err().code, "MISSING_AGENT_ID");
    }

    #[test]
    fn memory_errors_map_kind_into_code() {
        let result = ToolResult::err(MemoryError::SwapNotEnabled);
        assert!(!result.success);
        assert_eq!(result.error_code(), Some("SWAP_NOT_ENABLED"));
    }

    #[test]
    fn store_errors_carry_suggestions_through() {
        let result = ToolResult::err(StoreError::QueryFailed {
            message: "no such column".into(),
            suggestion: Some("known columns: a, b".into()),
        });
        assert_eq!(result.error_code(), Some("query_failed"));
        assert_eq!(
            result.error.unwrap().suggestion.as_deref(),
            Some("known columns: a, b")
        );
    }

    #[test]
    fn ok_result_serialises_without_error_field() {
        let json = serde_json::to_string(&ToolResult::ok(json!({"x": 1}))).unwrap();
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"success\":true"));
    }
}
