// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use engram_store::StoreError;

/// Memory-engine errors.
///
/// As with [`StoreError`], the `kind()` strings are part of the tool
/// contract.  The upper-case spellings are intentional; they match the wire
/// contract for context-value errors.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("promotion would overflow the context budget ({needed} tokens needed, {budget} available)")]
    TokenBudgetExceeded { needed: usize, budget: usize },
    #[error("recall requires a durable session store, but none is attached")]
    SwapNotEnabled,
    #[error("agent id is required but absent from the call context")]
    MissingAgentId,
    #[error("session id is required but absent from the call context")]
    MissingSessionId,
    #[error("unknown session: {0}")]
    SessionNotFound(String),
    #[error("{0}")]
    CircuitBreakerTripped(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MemoryError {
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::TokenBudgetExceeded { .. } => "token_budget_exceeded",
            MemoryError::SwapNotEnabled => "SWAP_NOT_ENABLED",
            MemoryError::MissingAgentId => "MISSING_AGENT_ID",
            MemoryError::MissingSessionId => "MISSING_SESSION_ID",
            MemoryError::SessionNotFound(_) => "not_found",
            MemoryError::CircuitBreakerTripped(_) => "circuit_breaker",
            MemoryError::Store(e) => e.kind(),
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            MemoryError::Store(e) => e.suggestion(),
            _ => None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_the_wire_contract() {
        assert_eq!(
            MemoryError::TokenBudgetExceeded {
                needed: 10,
                budget: 5
            }
            .kind(),
            "token_budget_exceeded"
        );
        assert_eq!(MemoryError::SwapNotEnabled.kind(), "SWAP_NOT_ENABLED");
        assert_eq!(MemoryError::MissingAgentId.kind(), "MISSING_AGENT_ID");
        assert_eq!(MemoryError::MissingSessionId.kind(), "MISSING_SESSION_ID");
    }

    #[test]
    fn store_errors_pass_their_kind_through() {
        let e = MemoryError::Store(StoreError::NotFound("x".into()));
        assert_eq!(e.kind(), "not_found");
    }
}
