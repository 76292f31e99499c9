// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use engram_config::RetryConfig;
use tracing::warn;

use crate::types::{ChatResponse, Message, ToolSchema};

/// Errors surfaced by an LLM provider.
///
/// `Transient` failures (network drops, 5xx) are eligible for retry;
/// everything else passes through to the caller untouched.  A `max_tokens`
/// stop is NOT an error; it arrives as a normal [`ChatResponse`] and feeds
/// the output-token circuit breaker downstream.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm call cancelled")]
    Cancelled,
}

/// The capability the memory core consumes from a language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError>;
}

/// Run `call` under the exponential-backoff policy.
///
/// Only [`LlmError::Transient`] is retried; the final transient error is
/// returned when attempts are exhausted.  Backoff: `initial * multiplier^n`,
/// capped at `max_backoff_ms`.
pub async fn call_with_retry<F, Fut>(policy: &RetryConfig, mut call: F) -> Result<ChatResponse, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ChatResponse, LlmError>>,
{
    let mut backoff = Duration::from_millis(policy.initial_backoff_ms);
    let cap = Duration::from_millis(policy.max_backoff_ms);
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(resp) => return Ok(resp),
            Err(LlmError::Transient(msg)) if attempt < policy.max_retries => {
                attempt += 1;
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, %msg, "retrying llm call");
                tokio::time::sleep(backoff).await;
                backoff = backoff.mul_f64(policy.multiplier).min(cap);
            }
            Err(e) => return Err(e),
        }
    }
}

/// One chat call with the policy's timeout and retry applied.
pub async fn chat_with_policy(
    client: &dyn LlmClient,
    policy: &RetryConfig,
    messages: &[Message],
    tools: &[ToolSchema],
) -> Result<ChatResponse, LlmError> {
    let timeout = Duration::from_secs(policy.request_timeout_secs);
    call_with_retry(policy, || async move {
        if timeout.is_zero() {
            client.chat(messages, tools).await
        } else {
            match tokio::time::timeout(timeout, client.chat(messages, tools)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(timeout)),
            }
        }
    })
    .await
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            multiplier: 2.0,
            max_backoff_ms: 4,
            request_timeout_secs: 0,
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result = call_with_retry(&fast_policy(3), move || {
            let a = a.clone();
            async move {
                if a.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmError::Transient("connection reset".into()))
                } else {
                    Ok(ChatResponse::text("ok"))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap().content, "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result = call_with_retry(&fast_policy(3), move || {
            let a = a.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                Err::<ChatResponse, _>(LlmError::Transient("still down".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(LlmError::Transient(_))));
        // initial attempt + 3 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn rejected_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result = call_with_retry(&fast_policy(3), move || {
            let a = a.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                Err::<ChatResponse, _>(LlmError::Rejected("bad request".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(LlmError::Rejected(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retries_fails_on_first_transient() {
        let result = call_with_retry(&fast_policy(0), || async {
            Err::<ChatResponse, _>(LlmError::Transient("down".into()))
        })
        .await;
        assert!(result.is_err());
    }
}
