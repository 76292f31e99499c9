// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use engram_config::FailureConfig;
use engram_model::{StopReason, ToolCall};
use serde::Serialize;
use serde_json::Value;

use crate::error::MemoryError;

/// Identity of one failure mode: same tool, same (canonicalized) params,
/// same error type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FailureSignature {
    pub tool_name: String,
    /// Params JSON with deterministically ordered keys
    pub params: String,
    pub error_type: String,
}

/// Per-session consecutive-failure bookkeeping plus the output-token circuit
/// breaker.  Callers hold this behind the session lock; the tracker itself
/// is plain data.
#[derive(Debug)]
pub struct FailureTracker {
    max_consecutive_failures: u32,
    circuit_threshold: u32,
    counts: HashMap<FailureSignature, u32>,
    output_token_streak: u32,
}

impl FailureTracker {
    pub fn new(config: &FailureConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            circuit_threshold: config.output_token_circuit_threshold,
            counts: HashMap::new(),
            output_token_streak: 0,
        }
    }

    // ── Consecutive-failure signatures ────────────────────────────────────────

    /// Record one failure and return the new consecutive count for its
    /// signature.
    pub fn record(&mut self, tool_name: &str, params: &Value, error_type: &str) -> u32 {
        let sig = FailureSignature {
            tool_name: tool_name.to_string(),
            params: canonicalize(params),
            error_type: error_type.to_string(),
        };
        let count = self.counts.entry(sig).or_insert(0);
        *count += 1;
        *count
    }

    /// Escalation text to attach to the tool result once the count reaches
    /// the threshold; `None` below it.
    pub fn escalation_message(&self, tool_name: &str, count: u32) -> Option<String> {
        if count < self.max_consecutive_failures {
            return None;
        }
        Some(format!(
            "REPEATED FAILURE: {tool_name} has now failed {count} times in a row with \
             identical parameters and the same error. Do not retry the same call again; \
             change the parameters, use a different tool, or report the blocker to the user."
        ))
    }

    /// Success of (tool, params) clears every signature for that pair,
    /// regardless of error type.
    pub fn clear(&mut self, tool_name: &str, params: &Value) {
        let canonical = canonicalize(params);
        self.counts
            .retain(|sig, _| !(sig.tool_name == tool_name && sig.params == canonical));
    }

    /// Current count for one signature (0 when never seen).
    pub fn count(&self, tool_name: &str, params: &Value, error_type: &str) -> u32 {
        let sig = FailureSignature {
            tool_name: tool_name.to_string(),
            params: canonicalize(params),
            error_type: error_type.to_string(),
        };
        self.counts.get(&sig).copied().unwrap_or(0)
    }

    /// All live signatures with their counts, for diagnostics.
    pub fn snapshot(&self) -> Vec<(FailureSignature, u32)> {
        let mut out: Vec<_> = self.counts.iter().map(|(s, c)| (s.clone(), *c)).collect();
        out.sort_by(|a, b| (&a.0.tool_name, &a.0.params).cmp(&(&b.0.tool_name, &b.0.params)));
        out
    }

    // ── Output-token circuit breaker ──────────────────────────────────────────

    /// Track one model stop reason.  `max_tokens` increments the streak and
    /// trips the breaker at the threshold; any other reason resets it.
    pub fn record_stop_reason(&mut self, reason: StopReason) -> Result<(), MemoryError> {
        match reason {
            StopReason::MaxTokens => {
                self.output_token_streak += 1;
                if self.output_token_streak >= self.circuit_threshold {
                    return Err(MemoryError::CircuitBreakerTripped(format!(
                        "OUTPUT TOKEN CIRCUIT BREAKER TRIGGERED: the model hit its output \
                         token limit {streak} times in a row. The task is producing more \
                         output than fits in a single response. Break the work into smaller \
                         chunks, write results incrementally (file by file, section by \
                         section), or use a more compact output format.",
                        streak = self.output_token_streak
                    )));
                }
            }
            _ => self.output_token_streak = 0,
        }
        Ok(())
    }

    pub fn output_token_streak(&self) -> u32 {
        self.output_token_streak
    }

    /// Manual reset after the operator (or agent loop) recovers.
    pub fn reset_output_breaker(&mut self) {
        self.output_token_streak = 0;
    }

    /// Truncation indicator: a tool call whose input is empty or carries only
    /// zero-valued fields usually means the model ran out of output tokens
    /// mid-call.
    pub fn is_truncation_indicator(call: &ToolCall) -> bool {
        call.input.values().all(is_zero_value)
    }
}

fn is_zero_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Deterministic params encoding.  `serde_json` maps iterate in sorted key
/// order (no `preserve_order` feature in this workspace), so a plain
/// serialization is already canonical.
fn canonicalize(params: &Value) -> String {
    params.to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
