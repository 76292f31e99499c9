// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{LlmClient, LlmError};
use crate::types::{ChatResponse, Message, Role, ToolSchema};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockLlm;

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");
        Ok(ChatResponse::text(format!("MOCK: {reply}")))
    }
}

/// A pre-scripted provider.  Each `chat` call pops the next response from
/// the front of the queue; the last request is captured for inspection.
/// This lets tests specify exact response sequences – including `max_tokens`
/// stops and re-ranking payloads – without network access.
pub struct ScriptedLlm {
    responses: Mutex<Vec<ChatResponse>>,
    /// The messages of the most recent `chat` call.
    pub last_request: Arc<Mutex<Option<Vec<Message>>>>,
    /// Total number of `chat` calls served.
    pub calls: Arc<Mutex<usize>>,
}

impl ScriptedLlm {
    /// Build a provider from an ordered list of responses.
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            last_request: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Convenience: provider that always answers with the same text.
    /// A single queued response repeats forever (see `chat`).
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![ChatResponse::text(reply.into())])
    }

    /// Convenience: `n` consecutive responses that stopped on `max_tokens`.
    pub fn truncated_n(n: usize) -> Self {
        Self::new(
            (0..n)
                .map(|i| ChatResponse::truncated(format!("partial output {i}")))
                .collect(),
        )
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError> {
        *self.last_request.lock().unwrap() = Some(messages.to_vec());
        *self.calls.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Default fallback when all scripts are consumed
            return Ok(ChatResponse::text("[no more scripts]"));
        }
        if responses.len() == 1 {
            // Keep the last response as a repeating fallback so summarizer
            // tests can run an arbitrary number of compactions.
            return Ok(responses[0].clone());
        }
        Ok(responses.remove(0))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StopReason;

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let c = MockLlm;
        let resp = c.chat(&[Message::user("hi")], &[]).await.unwrap();
        assert!(resp.content.contains("MOCK: hi"));
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn scripted_pops_responses_in_order() {
        let c = ScriptedLlm::new(vec![
            ChatResponse::text("first"),
            ChatResponse::text("second"),
        ]);
        assert_eq!(c.chat(&[], &[]).await.unwrap().content, "first");
        assert_eq!(c.chat(&[], &[]).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn scripted_last_response_repeats() {
        let c = ScriptedLlm::new(vec![ChatResponse::text("only")]);
        assert_eq!(c.chat(&[], &[]).await.unwrap().content, "only");
        assert_eq!(c.chat(&[], &[]).await.unwrap().content, "only");
    }

    #[tokio::test]
    async fn scripted_captures_last_request() {
        let c = ScriptedLlm::new(vec![ChatResponse::text("x")]);
        c.chat(&[Message::user("payload")], &[]).await.unwrap();
        let seen = c.last_request.lock().unwrap();
        assert_eq!(seen.as_ref().unwrap()[0].content, "payload");
    }

    #[tokio::test]
    async fn truncated_n_stops_on_max_tokens() {
        let c = ScriptedLlm::truncated_n(2);
        let r = c.chat(&[], &[]).await.unwrap();
        assert_eq!(r.stop_reason, StopReason::MaxTokens);
    }

    #[tokio::test]
    async fn scripted_empty_queue_falls_back() {
        let c = ScriptedLlm::new(vec![]);
        let r = c.chat(&[], &[]).await.unwrap();
        assert!(r.content.contains("no more scripts"));
    }
}
