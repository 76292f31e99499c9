// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use engram_model::Message;

/// One appended message, as broadcast on the observer bus.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub session_id: String,
    pub agent_id: String,
    pub message: Message,
}

/// A streaming consumer of session activity.
///
/// Delivery is best-effort and fire-and-forget: a slow observer sees its
/// queue overflow and events drop, never a stalled producer.  Per-observer
/// ordering matches the order of the triggering appends.
#[async_trait]
pub trait MemoryObserver: Send + Sync {
    async fn on_message(&self, event: MessageEvent);
}
