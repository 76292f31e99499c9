// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod client;
mod counter;
mod mock;
mod types;

pub use client::{call_with_retry, chat_with_policy, LlmClient, LlmError};
pub use counter::TokenCounter;
pub use mock::{MockLlm, ScriptedLlm};
pub use types::{
    ChatResponse, Message, Role, SessionContext, StopReason, ToolCall, ToolSchema, Usage,
};
