// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use engram_config::{BudgetConfig, RetryConfig};
use engram_model::{chat_with_policy, LlmClient, Message, TokenCounter};
use engram_store::{MemorySnapshot, SessionStore};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::MemoryError;
use crate::profile::{CompressionProfile, BUDGET_WARN_PERCENT};

/// Snapshot type written on every compaction.
pub const SNAPSHOT_L2_SUMMARY: &str = "l2_summary";
/// Snapshot type written when an oversized L2 evicts its oldest portion.
pub const SNAPSHOT_L2_EVICTED: &str = "l2_evicted";

const SUMMARIZE_PROMPT: &str =
    "You are a conversation memory compactor. Merge the existing summary and the new \
     messages below into one information-dense summary. Preserve decisions, tool outputs, \
     identifiers, file names, numbers, and open questions that later turns may need. \
     Respond with the summary text only.";

pub type SystemPromptFn = dyn Fn() -> String + Send + Sync;

/// Counters exposed by `swap_stats()`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SwapStats {
    pub compactions: u64,
    pub messages_compressed: u64,
    pub tokens_saved: u64,
    pub l2_evictions: u64,
}

/// Result of one compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub messages_compressed: usize,
    pub tokens_saved: usize,
}

/// Per-session segmented conversation memory.
///
/// Three tiers: **L1** holds recent messages at full fidelity, **L2** is a
/// single running summary produced by compressing the oldest L1 batches, and
/// **swap** is the durable message log in the session store ("all past
/// content", reachable through recall).  A separate promoted slot carries
/// messages temporarily re-injected from swap or search.
///
/// The store handle is shared, never owned, and the memory knows its session
/// only by id; reattachment after a restart rebuilds this struct from the
/// persisted messages and snapshots.
pub struct SegmentedMemory {
    session_id: String,
    store: Option<Arc<SessionStore>>,
    summarizer: Option<Arc<dyn LlmClient>>,
    retry: RetryConfig,
    profile: CompressionProfile,
    budget: BudgetConfig,
    counter: TokenCounter,
    system_prompt_fn: Option<Arc<SystemPromptFn>>,
    l1: VecDeque<Message>,
    l2_summary: String,
    l2_tokens: usize,
    promoted: Vec<Message>,
    stats: SwapStats,
}

impl SegmentedMemory {
    pub fn new(
        session_id: impl Into<String>,
        profile: CompressionProfile,
        budget: BudgetConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            store: None,
            summarizer: None,
            retry: RetryConfig::default(),
            profile,
            budget,
            counter: TokenCounter,
            system_prompt_fn: None,
            l1: VecDeque::new(),
            l2_summary: String::new(),
            l2_tokens: 0,
            promoted: Vec::new(),
            stats: SwapStats::default(),
        }
    }

    /// Attach the durable store (enables swap and snapshot persistence).
    pub fn with_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the LLM used for summarization, with its retry policy.
    pub fn with_summarizer(mut self, llm: Arc<dyn LlmClient>, retry: RetryConfig) -> Self {
        self.summarizer = Some(llm);
        self.retry = retry;
        self
    }

    pub fn with_system_prompt_fn(mut self, f: Arc<SystemPromptFn>) -> Self {
        self.system_prompt_fn = Some(f);
        self
    }

    pub fn set_system_prompt_fn(&mut self, f: Arc<SystemPromptFn>) {
        self.system_prompt_fn = Some(f);
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn profile(&self) -> &CompressionProfile {
        &self.profile
    }

    pub fn l1_len(&self) -> usize {
        self.l1.len()
    }

    pub fn l1_messages(&self) -> impl Iterator<Item = &Message> {
        self.l1.iter()
    }

    pub fn l2_summary(&self) -> &str {
        &self.l2_summary
    }

    pub fn l2_tokens(&self) -> usize {
        self.l2_tokens
    }

    pub fn promoted_len(&self) -> usize {
        self.promoted.len()
    }

    pub fn swap_stats(&self) -> SwapStats {
        self.stats
    }

    pub fn has_swap(&self) -> bool {
        self.store.is_some()
    }

    // ── Budget ────────────────────────────────────────────────────────────────

    /// Tokens the next model call would consume (system + L2 + promoted + L1).
    pub fn prompt_tokens(&self) -> usize {
        self.counter.count_messages(&self.messages_for_llm())
    }

    /// Percentage of the usable input budget currently consumed.
    pub fn budget_pct(&self) -> f64 {
        let budget = self.budget.input_budget();
        if budget == 0 {
            return 100.0;
        }
        self.prompt_tokens() as f64 / budget as f64 * 100.0
    }

    // ── Message intake ────────────────────────────────────────────────────────

    /// Append one message: persist it to swap, add it to L1, and compress if
    /// the message bound or the token budget demands it.  Returns the
    /// compaction report when compression ran.
    pub async fn add_message(
        &mut self,
        message: Message,
    ) -> Result<Option<CompactionReport>, MemoryError> {
        if let Some(store) = &self.store {
            store.save_message(&self.session_id, &message).await?;
        }
        self.l1.push_back(message);
        self.compress_if_needed().await
    }

    async fn compress_if_needed(&mut self) -> Result<Option<CompactionReport>, MemoryError> {
        let pct = self.budget_pct();
        if pct > BUDGET_WARN_PERCENT as f64 {
            warn!(
                session_id = %self.session_id,
                budget_pct = pct,
                "context budget pressure"
            );
        }

        let mut total = CompactionReport::default();
        let mut passes = 0u8;
        while (self.l1.len() > self.profile.max_l1_messages
            || self.budget_pct() > self.profile.force_threshold_percent as f64)
            && passes < 8
        {
            let report = self.compact(false).await?;
            if report.messages_compressed == 0 {
                break;
            }
            total.messages_compressed += report.messages_compressed;
            total.tokens_saved += report.tokens_saved;
            passes += 1;
        }
        Ok((total.messages_compressed > 0).then_some(total))
    }

    // ── Compression ───────────────────────────────────────────────────────────

    /// Compress the oldest L1 batch into the L2 summary.
    ///
    /// A no-op below `min_l1_messages` unless `force`.  The batch extends past
    /// its nominal size to swallow tool results answering a drained assistant
    /// call, so a tool result never survives without its tool_use partner.
    pub async fn compact(&mut self, force: bool) -> Result<CompactionReport, MemoryError> {
        if self.l1.is_empty() || (self.l1.len() < self.profile.min_l1_messages && !force) {
            return Ok(CompactionReport::default());
        }

        let batch_size = self.profile.batch_size_for(self.budget_pct()).max(1);
        let mut batch: Vec<Message> = Vec::with_capacity(batch_size + 2);
        for _ in 0..batch_size {
            match self.l1.pop_front() {
                Some(m) => batch.push(m),
                None => break,
            }
        }
        // An orphaned tool result at the L1 head joins the batch so it never
        // outlives the assistant call it answers.
        while self.l1.front().is_some_and(|m| m.tool_use_id.is_some()) {
            if let Some(m) = self.l1.pop_front() {
                batch.push(m);
            }
        }

        let old_tokens = self.l2_tokens + self.counter.count_messages(&batch);
        let target_tokens = self.summary_target_tokens();
        let mut summary = self.summarize(&batch, target_tokens).await;

        // Compression must never grow the context: clamp the new summary to
        // the token mass it replaces.
        let cap_chars = old_tokens.saturating_mul(4);
        if summary.len() > cap_chars {
            summary = truncate_at_char_boundary(&summary, cap_chars);
        }

        self.l2_summary = summary;
        self.l2_tokens = self.counter.count_str(&self.l2_summary);

        if let Some(store) = &self.store {
            store
                .save_memory_snapshot(&MemorySnapshot {
                    session_id: self.session_id.clone(),
                    snapshot_type: SNAPSHOT_L2_SUMMARY.into(),
                    summary: self.l2_summary.clone(),
                    token_count: self.l2_tokens,
                    created_at: Utc::now(),
                })
                .await?;
        }

        let tokens_saved = old_tokens.saturating_sub(self.l2_tokens);
        self.evict_l2_if_needed().await?;

        self.stats.compactions += 1;
        self.stats.messages_compressed += batch.len() as u64;
        self.stats.tokens_saved += tokens_saved as u64;
        debug!(
            session_id = %self.session_id,
            compressed = batch.len(),
            tokens_saved,
            "compacted L1 batch into L2"
        );

        Ok(CompactionReport {
            messages_compressed: batch.len(),
            tokens_saved,
        })
    }

    fn summary_target_tokens(&self) -> usize {
        self.profile
            .max_l2_tokens
            .min((self.budget.reserved() / 2).max(32))
    }

    async fn summarize(&self, batch: &[Message], target_tokens: usize) -> String {
        if let Some(llm) = &self.summarizer {
            let request = vec![
                Message::system(format!(
                    "{SUMMARIZE_PROMPT}\nKeep the summary under roughly {target_tokens} tokens."
                )),
                Message::user(format!(
                    "Existing summary:\n{}\n\nNew messages:\n{}",
                    if self.l2_summary.is_empty() {
                        "(none)"
                    } else {
                        &self.l2_summary
                    },
                    serialize_history(batch)
                )),
            ];
            match chat_with_policy(llm.as_ref(), &self.retry, &request, &[]).await {
                Ok(resp) if !resp.content.trim().is_empty() => return resp.content,
                Ok(_) => warn!(session_id = %self.session_id, "summarizer returned empty text"),
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "summarizer failed")
                }
            }
        }
        extractive_summary(&self.l2_summary, batch, target_tokens)
    }

    /// Evict the oldest portion of an oversized L2 summary into a tagged
    /// swap snapshot.
    async fn evict_l2_if_needed(&mut self) -> Result<(), MemoryError> {
        while self.l2_tokens > self.profile.max_l2_tokens {
            let split = char_boundary_at(&self.l2_summary, self.l2_summary.len() / 2);
            if split == 0 {
                break;
            }
            let evicted: String = self.l2_summary[..split].to_string();
            if let Some(store) = &self.store {
                store
                    .save_memory_snapshot(&MemorySnapshot {
                        session_id: self.session_id.clone(),
                        snapshot_type: SNAPSHOT_L2_EVICTED.into(),
                        summary: evicted.clone(),
                        token_count: self.counter.count_str(&evicted),
                        created_at: Utc::now(),
                    })
                    .await?;
            }
            self.l2_summary = self.l2_summary[split..].trim_start().to_string();
            self.l2_tokens = self.counter.count_str(&self.l2_summary);
            self.stats.l2_evictions += 1;
        }
        Ok(())
    }

    // ── Prompt assembly ───────────────────────────────────────────────────────

    /// The exact message list the next model call receives:
    /// system prompt, L2 summary (as a synthetic system message), promoted
    /// context, then L1, each in chronological order.
    pub fn messages_for_llm(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(2 + self.promoted.len() + self.l1.len());
        if let Some(f) = &self.system_prompt_fn {
            let text = f();
            if !text.is_empty() {
                out.push(Message::system(text));
            }
        }
        if !self.l2_summary.is_empty() {
            out.push(Message::system(format!(
                "Summary of earlier conversation (compressed):\n{}",
                self.l2_summary
            )));
        }
        out.extend(self.promoted.iter().cloned());
        out.extend(self.l1.iter().cloned());
        out
    }

    // ── Promotion ─────────────────────────────────────────────────────────────

    /// Re-inject archived messages into the prompt.  Fails without mutating
    /// anything when the resulting prompt would overflow the input budget.
    pub fn promote(&mut self, messages: Vec<Message>) -> Result<(), MemoryError> {
        let budget = self.budget.input_budget();
        let needed = self.prompt_tokens() + self.counter.count_messages(&messages);
        if needed > budget {
            return Err(MemoryError::TokenBudgetExceeded { needed, budget });
        }
        self.promoted.extend(messages);
        Ok(())
    }

    /// Empty the promoted slot; returns how many messages were dropped.
    pub fn clear_promoted(&mut self) -> usize {
        let n = self.promoted.len();
        self.promoted.clear();
        n
    }

    // ── Reattachment ──────────────────────────────────────────────────────────

    /// Rebuild the in-memory tiers after a session load: the persisted tail
    /// becomes L1 (bounded by the profile), the latest snapshot becomes L2.
    /// Everything older stays in swap only.
    pub fn reattach(&mut self, tail: Vec<Message>, summary: Option<MemorySnapshot>) {
        let keep = self.profile.max_l1_messages;
        let skip = tail.len().saturating_sub(keep);
        self.l1 = tail.into_iter().skip(skip).collect();
        if let Some(snapshot) = summary {
            self.l2_tokens = self.counter.count_str(&snapshot.summary);
            self.l2_summary = snapshot.summary;
        }
        self.promoted.clear();
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Serialise a message batch into plain text for the compaction prompt.
fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let mut line = format!("{}: {}", role_label(m), m.content);
            for call in &m.tool_calls {
                line.push_str(&format!(
                    " [tool_call: {}({})]",
                    call.name,
                    serde_json::Value::Object(call.input.clone())
                ));
            }
            if let Some(result) = &m.tool_result {
                line.push_str(&format!(" [tool_result: {result}]"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn role_label(m: &Message) -> &'static str {
    match m.role {
        engram_model::Role::User => "User",
        engram_model::Role::Assistant => "Assistant",
        engram_model::Role::Tool => "Tool",
        engram_model::Role::System => "System",
    }
}

/// Deterministic fallback summary used when no summarizer is attached or the
/// model call fails.  Extractive: one head line per message, bounded by the
/// target so the monotonic-token invariant holds on this path too.
fn extractive_summary(existing: &str, batch: &[Message], target_tokens: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    if !existing.is_empty() {
        lines.push(existing.to_string());
    }
    for m in batch {
        let head: String = m.content.chars().take(120).collect();
        if !head.is_empty() {
            lines.push(format!("{}: {head}", role_label(m)));
        } else if let Some(result) = &m.tool_result {
            let rendered: String = result.to_string().chars().take(120).collect();
            lines.push(format!("{}: {rendered}", role_label(m)));
        }
    }
    truncate_at_char_boundary(&lines.join("\n"), target_tokens.saturating_mul(4))
}

fn char_boundary_at(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> String {
    s[..char_boundary_at(s, max_bytes)].to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
