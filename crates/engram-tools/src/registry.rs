// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::tool::{Tool, ToolContext, ToolEvent, ToolResult};

/// Interval between keepalive progress ticks during a tool call.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Schema triple handed to the model.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Central registry holding all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for all registered tools, sorted by name for determinism.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute a tool, stamping the wall-clock duration on the result.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, input: Value) -> ToolResult {
        let started = Instant::now();
        let mut result = match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, input).await,
            None => ToolResult::invalid_input(format!("unknown tool: {name}")),
        };
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Execute with keepalive: while the call runs, an indeterminate
    /// progress event (`progress = -1`) fires on `events` every 10 s so
    /// the caller's transport never sees a silent long call.
    pub async fn execute_with_keepalive(
        &self,
        ctx: &ToolContext,
        call_id: &str,
        name: &str,
        input: Value,
        events: mpsc::Sender<ToolEvent>,
    ) -> ToolResult {
        let keepalive_id = call_id.to_string();
        let execution = self.execute(ctx, name, input);
        tokio::pin!(execution);
        let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
        ticker.tick().await; // the first tick fires immediately; skip it
        loop {
            tokio::select! {
                result = &mut execution => return result,
                _ = ticker.tick() => {
                    let _ = events
                        .send(ToolEvent::Progress {
                            call_id: keepalive_id.clone(),
                            progress: -1.0,
                        })
                        .await;
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
