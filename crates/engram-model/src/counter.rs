// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::types::Message;

/// Deterministic token estimator.
///
/// Uses a 4-bytes-per-token heuristic with a floor of one token per
/// non-empty string.  The same counter runs before persistence and after
/// reload, so a reattached session computes exactly the budget numbers it
/// had before the restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    /// Estimate tokens for a plain string.  Empty input counts zero.
    pub fn count_str(&self, s: &str) -> usize {
        if s.is_empty() {
            return 0;
        }
        (s.len() / 4).max(1)
    }

    /// Estimate tokens for one message: content plus tool-call payloads plus
    /// the structured tool result, floored at one token per message.
    pub fn count_message(&self, msg: &Message) -> usize {
        let mut chars = msg.content.len();
        for call in &msg.tool_calls {
            chars += call.name.len();
            chars += serde_json::to_string(&call.input).map_or(0, |s| s.len());
        }
        if let Some(result) = &msg.tool_result {
            chars += serde_json::to_string(result).map_or(0, |s| s.len());
        }
        (chars / 4).max(1)
    }

    /// Sum over a message slice.
    pub fn count_messages(&self, msgs: &[Message]) -> usize {
        msgs.iter().map(|m| self.count_message(m)).sum()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{Message, ToolCall};

    #[test]
    fn count_str_divides_by_four() {
        assert_eq!(TokenCounter.count_str("12345678"), 2);
    }

    #[test]
    fn count_str_minimum_one_for_non_empty() {
        assert_eq!(TokenCounter.count_str("ab"), 1);
    }

    #[test]
    fn count_str_empty_is_zero() {
        assert_eq!(TokenCounter.count_str(""), 0);
    }

    #[test]
    fn count_message_minimum_is_one() {
        assert_eq!(TokenCounter.count_message(&Message::user("")), 1);
    }

    #[test]
    fn count_message_includes_tool_result_json() {
        let bare = Message::tool_result("c1", "done", None);
        let with_payload = Message::tool_result(
            "c1",
            "done",
            Some(json!({"rows": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]})),
        );
        assert!(TokenCounter.count_message(&with_payload) > TokenCounter.count_message(&bare));
    }

    #[test]
    fn count_message_includes_tool_call_arguments() {
        let small = Message::assistant_tool_calls(
            "",
            vec![ToolCall::new("1", "t", json!({}))],
        );
        let big = Message::assistant_tool_calls(
            "",
            vec![ToolCall::new(
                "1",
                "t",
                json!({"query": "SELECT * FROM results WHERE amount > 100"}),
            )],
        );
        assert!(TokenCounter.count_message(&big) > TokenCounter.count_message(&small));
    }

    #[test]
    fn count_messages_sums_slice() {
        let msgs = vec![Message::user("12345678"), Message::assistant("abcd")];
        // 2 + 1
        assert_eq!(TokenCounter.count_messages(&msgs), 3);
    }

    #[test]
    fn counter_is_deterministic_across_calls() {
        let m = Message::tool_result("c", "payload here", Some(json!({"k": "v"})));
        assert_eq!(TokenCounter.count_message(&m), TokenCounter.count_message(&m));
    }
}
