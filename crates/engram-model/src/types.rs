// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::counter::TokenCounter;

// ─── Roles and session context ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Which layer of a hierarchical agent produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionContext {
    #[default]
    Direct,
    Coordinator,
    Subagent,
}

impl std::fmt::Display for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionContext::Direct => write!(f, "direct"),
            SessionContext::Coordinator => write!(f, "coordinator"),
            SessionContext::Subagent => write!(f, "subagent"),
        }
    }
}

impl std::str::FromStr for SessionContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(SessionContext::Direct),
            "coordinator" => Ok(SessionContext::Coordinator),
            "subagent" => Ok(SessionContext::Subagent),
            other => Err(format!("unknown session context: {other}")),
        }
    }
}

// ─── Tool calls ───────────────────────────────────────────────────────────────

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Argument mapping (string → arbitrary JSON value)
    pub input: serde_json::Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        let input = match input {
            Value::Object(m) => m,
            _ => serde_json::Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// A single message in the conversation history.
///
/// Messages are append-only; once persisted they are never mutated.
/// `token_count` is fixed at construction from the deterministic counter so
/// budget math stays stable across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool invocations requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Links a tool message back to the assistant tool call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// Structured tool result payload, when the textual content is a rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub session_context: SessionContext,
    pub timestamp: DateTime<Utc>,
    pub token_count: usize,
    #[serde(default)]
    pub cost_usd: f64,
}

impl Message {
    fn base(role: Role, content: String) -> Self {
        let token_count = TokenCounter.count_str(&content);
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_use_id: None,
            tool_result: None,
            session_context: SessionContext::Direct,
            timestamp: Utc::now(),
            token_count,
            cost_usd: 0.0,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::base(Role::System, text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::base(Role::User, text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::base(Role::Assistant, text.into())
    }

    /// Assistant message carrying tool invocations.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut m = Self::base(Role::Assistant, text.into());
        m.tool_calls = calls;
        m.token_count = TokenCounter.count_message(&m);
        m
    }

    /// Tool result answering the assistant call `tool_use_id`.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        result: Option<Value>,
    ) -> Self {
        let mut m = Self::base(Role::Tool, content.into());
        m.tool_use_id = Some(tool_use_id.into());
        m.tool_result = result;
        m.token_count = TokenCounter.count_message(&m);
        m
    }

    /// Tag the message with the producing session layer.
    pub fn with_context(mut self, ctx: SessionContext) -> Self {
        self.session_context = ctx;
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    /// True when this message participates in a tool-call exchange;
    /// either requesting calls or answering one.
    pub fn is_tool_exchange(&self) -> bool {
        !self.tool_calls.is_empty() || self.tool_use_id.is_some()
    }
}

// ─── LLM provider contract ────────────────────────────────────────────────────

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::ToolUse => write!(f, "tool_use"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
        }
    }
}

/// Token usage from one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
}

/// One complete model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub stop_reason: StopReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Plain text response that ended normally.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stop_reason: StopReason::EndTurn,
            tool_calls: Vec::new(),
            usage: Usage::default(),
        }
    }

    /// Response truncated by the output-token limit.
    pub fn truncated(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stop_reason: StopReason::MaxTokens,
            tool_calls: Vec::new(),
            usage: Usage::default(),
        }
    }
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: Value,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
