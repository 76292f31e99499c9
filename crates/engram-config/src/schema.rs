// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub failure: FailureConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

// ─── Token budget ─────────────────────────────────────────────────────────────

/// Per-turn token budget.
///
/// The usable input budget for any prompt is
/// `max_context_tokens - reserved_output_tokens`; the memory engine keeps the
/// assembled prompt under that bound at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total context window of the target model
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Tokens reserved for model output.  When absent, 10% of
    /// `max_context_tokens` is used.
    #[serde(default)]
    pub reserved_output_tokens: Option<usize>,
}

impl BudgetConfig {
    /// Reserved output tokens, applying the 10%-of-window default.
    pub fn reserved(&self) -> usize {
        self.reserved_output_tokens
            .unwrap_or(self.max_context_tokens / 10)
    }

    /// Usable input budget: window minus reservation.
    pub fn input_budget(&self) -> usize {
        self.max_context_tokens.saturating_sub(self.reserved())
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            reserved_output_tokens: None,
        }
    }
}

fn default_max_context_tokens() -> usize {
    200_000
}

// ─── Memory / compression ─────────────────────────────────────────────────────

/// Named bundle of compression thresholds and batch sizes.
///
/// `conversational` keeps a larger hot tier and compresses in small batches;
/// suited to chat-style sessions where recent turns matter most.
/// `data_intensive` keeps a smaller hot tier and compresses in larger batches,
/// tuned for tool-heavy workloads that generate bulky results.
/// `balanced` is the default middle ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadProfile {
    Conversational,
    DataIntensive,
    #[default]
    Balanced,
}

impl std::fmt::Display for WorkloadProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadProfile::Conversational => write!(f, "conversational"),
            WorkloadProfile::DataIntensive => write!(f, "data_intensive"),
            WorkloadProfile::Balanced => write!(f, "balanced"),
        }
    }
}

/// Compression batch sizes by budget pressure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSizes {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
}

/// Segmented-memory tuning.  Unset fields fall back to the preset values of
/// `workload_profile`, so a config file only needs to name a profile unless
/// it wants to pin individual knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub workload_profile: WorkloadProfile,
    /// Hard upper bound on L1 (hot) messages
    #[serde(default)]
    pub max_l1_messages: Option<usize>,
    /// Compaction is a no-op below this many L1 messages unless forced
    #[serde(default)]
    pub min_l1_messages: Option<usize>,
    /// Budget percentage above which a warning is logged
    #[serde(default)]
    pub warning_threshold_percent: Option<u8>,
    /// Budget percentage above which compression switches to the critical
    /// batch size.  The engine always force-compresses above 70% regardless
    /// of this value; this knob only controls when compression turns
    /// aggressive.
    #[serde(default)]
    pub critical_threshold_percent: Option<u8>,
    #[serde(default)]
    pub batch_sizes: Option<BatchSizes>,
    /// Upper bound on the L2 summary before its oldest portion is evicted
    /// to swap
    #[serde(default)]
    pub max_l2_tokens: Option<usize>,
}

// ─── Failure tracking ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    /// Consecutive identical tool failures before the escalation marker is
    /// attached to the tool result
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Consecutive `max_tokens` stops before the output-token circuit breaker
    /// aborts the conversation
    #[serde(default = "default_output_token_circuit_threshold")]
    pub output_token_circuit_threshold: u32,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            output_token_circuit_threshold: default_output_token_circuit_threshold(),
        }
    }
}

fn default_max_consecutive_failures() -> u32 {
    2
}
fn default_output_token_circuit_threshold() -> u32 {
    3
}

// ─── LLM retry policy ─────────────────────────────────────────────────────────

/// Exponential-backoff retry policy for LLM calls.
///
/// Applies only to transient failures (network, 5xx).  Semantic outcomes such
/// as a `max_tokens` stop are never retried; they feed the circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-call wall-clock timeout in seconds (0 = no limit)
    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: 0,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_backoff_ms() -> u64 {
    5000
}

// ─── Durable store ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the session database and the `swap/` spill area.
    /// When absent, `~/.local/share/engram` (platform equivalent) is used.
    #[serde(default)]
    pub state_dir: Option<std::path::PathBuf>,
    /// Time-to-live for stored large results, in seconds
    #[serde(default = "default_large_result_ttl_secs")]
    pub large_result_ttl_secs: u64,
    /// Payloads above this size are spilled from heap to the swap directory
    #[serde(default = "default_spill_threshold_bytes")]
    pub spill_threshold_bytes: usize,
    /// Tool outputs above this size are routed to the large-result store and
    /// replaced by a `DataRef` in the message log
    #[serde(default = "default_inline_result_threshold_bytes")]
    pub inline_result_threshold_bytes: usize,
}

impl StoreConfig {
    /// Resolved state directory, applying the platform default.
    pub fn resolved_state_dir(&self) -> std::path::PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("/tmp"))
            .join("engram")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            large_result_ttl_secs: default_large_result_ttl_secs(),
            spill_threshold_bytes: default_spill_threshold_bytes(),
            inline_result_threshold_bytes: default_inline_result_threshold_bytes(),
        }
    }
}

fn default_large_result_ttl_secs() -> u64 {
    3600
}
fn default_spill_threshold_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_inline_result_threshold_bytes() -> usize {
    16 * 1024
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
