// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use engram_config::RetryConfig;
use engram_model::{chat_with_policy, LlmClient, Message};
use engram_store::{SearchHit, SessionStore};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::MemoryError;
use crate::session::Session;

/// Candidate multiplier: fetch K = 3 × limit from FTS before re-ranking.
const CANDIDATE_MULTIPLIER: usize = 3;

const RERANK_PROMPT: &str =
    "You are a relevance ranker. Given a query and a numbered list of candidate messages, \
     score each candidate's relevance to the query from 0.0 to 1.0. Respond ONLY with a \
     JSON array of objects of the form {\"index\": <candidate number>, \"score\": <0.0-1.0>}.";

/// One ranked recall result.
#[derive(Debug, Clone)]
pub struct RecallHit {
    pub message_id: i64,
    pub message: Message,
    pub score: f64,
}

/// Semantic recall: BM25 candidate retrieval, optional LLM re-ranking, and
/// token-budgeted promotion back into the live prompt.
pub struct RecallPipeline {
    store: Arc<SessionStore>,
    llm: Option<Arc<dyn LlmClient>>,
    retry: RetryConfig,
}

impl std::fmt::Debug for RecallPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallPipeline")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RecallPipeline {
    pub fn new(
        store: Arc<SessionStore>,
        llm: Option<Arc<dyn LlmClient>>,
        retry: RetryConfig,
    ) -> Self {
        Self { store, llm, retry }
    }

    /// Search the session's swap.  With `promote`, the top hits enter the
    /// promoted context; all of them or none, gated by the token budget.
    pub async fn search(
        &self,
        session: &Session,
        query: &str,
        limit: usize,
        promote: bool,
    ) -> Result<Vec<RecallHit>, MemoryError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let k = limit.saturating_mul(CANDIDATE_MULTIPLIER).max(limit);
        let candidates = self.store.search_fts(&session.id, query, k).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = self.rerank(query, candidates).await;
        let top: Vec<RecallHit> = ranked.into_iter().take(limit).collect();

        if promote {
            let messages: Vec<Message> = top.iter().map(|h| h.message.clone()).collect();
            session.memory.lock().await.promote(messages)?;
        }
        Ok(top)
    }

    /// A raw chronological slice of swap (for `recall_conversation`).
    pub async fn slice(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        let stored = self
            .store
            .load_messages(session_id, Some(limit), Some(offset))
            .await?;
        Ok(stored.into_iter().map(|m| m.message).collect())
    }

    /// Re-rank candidates with the LLM when one is configured.  Any failure
    /// (no LLM, transport error, malformed JSON) falls back to BM25 order.
    /// Ties and unscored candidates keep their BM25 relative order.
    async fn rerank(&self, query: &str, candidates: Vec<SearchHit>) -> Vec<RecallHit> {
        let n = candidates.len();
        let mut hits: Vec<RecallHit> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, h)| RecallHit {
                message_id: h.message_id,
                message: h.message,
                // Positional score so BM25 order survives a fallback.
                score: 1.0 - i as f64 / n as f64,
            })
            .collect();

        let Some(llm) = &self.llm else {
            return hits;
        };

        let listing = hits
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let head: String = h.message.content.chars().take(300).collect();
                format!("[{i}] {head}")
            })
            .collect::<Vec<_>>()
            .join("\n");
        let request = vec![
            Message::system(RERANK_PROMPT),
            Message::user(format!("Query: {query}\n\nCandidates:\n{listing}")),
        ];

        let response = match chat_with_policy(llm.as_ref(), &self.retry, &request, &[]).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "re-ranking failed; keeping BM25 order");
                return hits;
            }
        };

        match parse_rerank_scores(&response.content, n) {
            Some(scores) => {
                for (index, score) in scores {
                    hits[index].score = score;
                }
                // Stable sort: equal scores keep BM25 order.
                hits.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                hits
            }
            None => {
                debug!("re-ranker output unparseable; keeping BM25 order");
                hits
            }
        }
    }
}

/// Extract `{index, score}` pairs from the model's reply.
///
/// Lenient by design: scans for the outermost JSON array, skips malformed
/// items and out-of-range indexes, and returns `None` only when nothing
/// usable is found (callers then keep the BM25 order).
fn parse_rerank_scores(text: &str, candidate_count: usize) -> Option<Vec<(usize, f64)>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    let parsed: Value = serde_json::from_str(&text[start..=end]).ok()?;
    let items = parsed.as_array()?;
    let scores: Vec<(usize, f64)> = items
        .iter()
        .filter_map(|item| {
            let index = item.get("index")?.as_u64()? as usize;
            let score = item.get("score")?.as_f64()?;
            (index < candidate_count).then_some((index, score))
        })
        .collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
