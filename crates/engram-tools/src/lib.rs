// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod builtin;
mod registry;
mod tool;

pub use builtin::{
    standard_registry, ClearRecalledContextTool, GetErrorDetailsTool, GetToolResultTool,
    QueryToolResultTool, RecallConversationTool, SearchConversationTool, SessionMemoryTool,
};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolContext, ToolError, ToolEvent, ToolResult};
