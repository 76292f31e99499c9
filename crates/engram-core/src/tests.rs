// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-module end-to-end scenarios for the memory engine.

use std::sync::Arc;

use engram_config::{BudgetConfig, Config, MemoryConfig, WorkloadProfile};
use engram_model::{LlmClient, Message, Role, ScriptedLlm, StopReason};
use engram_store::SessionStore;

use crate::failure::FailureTracker;
use crate::manager::MemoryManager;
use crate::memory::SNAPSHOT_L2_SUMMARY;
use crate::profile::CompressionProfile;

async fn store() -> Arc<SessionStore> {
    Arc::new(SessionStore::open_in_memory().await.unwrap())
}

fn conversational_config() -> Config {
    Config {
        memory: MemoryConfig {
            workload_profile: WorkloadProfile::Conversational,
            ..Default::default()
        },
        ..Default::default()
    }
}

// ─── Compression under pressure ───────────────────────────────────────────────

#[tokio::test]
async fn twenty_messages_compress_into_bounded_l1_plus_l2() {
    let store = store().await;
    let llm = Arc::new(ScriptedLlm::always_text(
        "User asked about the data pipeline; assistant inspected rows and reported totals.",
    ));
    let manager = MemoryManager::new(&conversational_config())
        .with_store(store.clone())
        .with_llm(llm);
    manager
        .set_system_prompt_fn(Arc::new(|| "You are the test agent.".to_string()))
        .await;

    let session = manager
        .get_or_create_session("pressure", None, None)
        .await
        .unwrap();
    for i in 0..20 {
        manager
            .add_message("pressure", Message::user(format!("turn {i} content")))
            .await
            .unwrap();
    }

    let memory = session.memory.lock().await;
    assert!(memory.l1_len() <= 12, "L1 must respect the conversational bound");
    assert!(!memory.l2_summary().is_empty(), "L2 must hold a summary");

    // The summary must also be durable.
    let snapshot = store
        .latest_memory_snapshot("pressure", SNAPSHOT_L2_SUMMARY)
        .await
        .unwrap()
        .expect("compaction must persist a snapshot");
    assert!(!snapshot.summary.is_empty());

    // Prompt shape: system + L2 summary + at most 12 L1 messages.
    let prompt = memory.messages_for_llm();
    assert_eq!(prompt[0].content, "You are the test agent.");
    assert!(prompt[1].content.contains("Summary of earlier conversation"));
    assert!(prompt.len() <= 2 + 12);
}

// ─── Budget invariant ─────────────────────────────────────────────────────────

#[tokio::test]
async fn prompt_stays_under_input_budget_throughout_a_long_stream() {
    let store = store().await;
    let config = Config {
        budget: BudgetConfig {
            max_context_tokens: 2000,
            reserved_output_tokens: Some(400),
        },
        ..conversational_config()
    };
    let manager = MemoryManager::new(&config).with_store(store);
    let session = manager
        .get_or_create_session("budgeted", None, None)
        .await
        .unwrap();

    for i in 0..60 {
        manager
            .add_message(
                "budgeted",
                Message::user(format!("message {i}: {}", "detail ".repeat(10))),
            )
            .await
            .unwrap();
        let memory = session.memory.lock().await;
        assert!(
            memory.prompt_tokens() <= 1600,
            "prompt exceeded the input budget after message {i}"
        );
    }
}

// ─── Recall + promote + budget ────────────────────────────────────────────────

#[tokio::test]
async fn oversized_promotion_fails_and_small_one_lands_in_prompt() {
    let store = store().await;
    let config = Config {
        budget: BudgetConfig {
            max_context_tokens: 500,
            reserved_output_tokens: Some(100),
        },
        ..Default::default()
    };
    let manager = MemoryManager::new(&config).with_store(store.clone());
    let session = manager
        .get_or_create_session("recall", None, None)
        .await
        .unwrap();
    // Populate swap directly so L1 stays small while the archive is large.
    for i in 0..100 {
        store
            .save_message(
                "recall",
                &Message::user(format!("archived finding {i}: {}", "x".repeat(100))),
            )
            .await
            .unwrap();
    }

    let err = manager
        .search_conversation("recall", "finding", 50, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "token_budget_exceeded");
    assert_eq!(session.memory.lock().await.promoted_len(), 0);

    let hits = manager
        .search_conversation("recall", "finding", 2, true)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    let memory = session.memory.lock().await;
    assert_eq!(memory.promoted_len(), 2);
    let prompt = memory.messages_for_llm();
    assert!(prompt.iter().any(|m| m.content.contains("archived finding")));
}

// ─── Circuit breaker ──────────────────────────────────────────────────────────

#[tokio::test]
async fn three_truncated_responses_trip_the_breaker_then_reset_recovers() {
    let llm = ScriptedLlm::truncated_n(3);
    let mut tracker = FailureTracker::new(&Default::default());

    // Drive an agent-loop shaped interaction: each model response feeds the
    // tracker; the third max_tokens stop must abort hard.
    let mut fatal = None;
    for _ in 0..3 {
        let response = llm.chat(&[], &[]).await.unwrap();
        if let Err(e) = tracker.record_stop_reason(response.stop_reason) {
            fatal = Some(e);
            break;
        }
    }
    let fatal = fatal.expect("third truncation must abort");
    let message = fatal.to_string();
    assert!(message.contains("OUTPUT TOKEN CIRCUIT BREAKER TRIGGERED"));
    assert!(message.contains('3'));

    // Manual reset, then a healthy response keeps the tracker clean.
    tracker.reset_output_breaker();
    tracker.record_stop_reason(StopReason::EndTurn).unwrap();
    assert_eq!(tracker.output_token_streak(), 0);
}

// ─── Persistence round trip ───────────────────────────────────────────────────

#[tokio::test]
async fn messages_survive_reload_in_original_form() {
    let store = store().await;
    let manager = MemoryManager::new(&Config::default()).with_store(store.clone());
    manager.get_or_create_session("rt", None, None).await.unwrap();

    let original = Message::tool_result(
        "call-7",
        "42 rows scanned",
        Some(serde_json::json!({"rows": 42})),
    );
    manager.add_message("rt", original.clone()).await.unwrap();

    let loaded = store.load_messages("rt", None, None).await.unwrap();
    assert_eq!(loaded.len(), 1);
    let m = &loaded[0].message;
    assert_eq!(m.role, original.role);
    assert_eq!(m.content, original.content);
    assert_eq!(m.tool_use_id, original.tool_use_id);
    assert_eq!(m.tool_result, original.tool_result);
    assert_eq!(m.token_count, original.token_count);
}

// ─── Restart equivalence ──────────────────────────────────────────────────────

#[tokio::test]
async fn restarted_session_serves_the_same_prompt_view() {
    let store = store().await;
    let llm = Arc::new(ScriptedLlm::always_text("summary of early turns"));

    let prompt_before = {
        let manager = MemoryManager::new(&conversational_config())
            .with_store(store.clone())
            .with_llm(llm.clone());
        let session = manager.get_or_create_session("eq", None, None).await.unwrap();
        for i in 0..18 {
            manager
                .add_message("eq", Message::user(format!("stable content {i}")))
                .await
                .unwrap();
        }
        let memory = session.memory.lock().await;
        memory.messages_for_llm()
    };

    // Simulate a process restart: fresh manager, same store, same profile.
    let manager = MemoryManager::new(&conversational_config())
        .with_store(store)
        .with_llm(llm);
    let session = manager.get_or_create_session("eq", None, None).await.unwrap();
    let memory = session.memory.lock().await;
    let prompt_after = memory.messages_for_llm();

    let l1_before: Vec<&str> = prompt_before
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    let l1_after: Vec<&str> = prompt_after
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    // Reattachment replays up to max_l1 messages, which may reach slightly
    // further back than the live L1 did after its last compaction; the live
    // view must be a suffix of the replayed one, ending on the same message.
    assert!(
        l1_after.len() >= l1_before.len(),
        "replay must cover at least the live L1"
    );
    assert!(
        l1_after.ends_with(&l1_before),
        "live L1 must be a suffix of the reattached view"
    );
    assert!(
        prompt_after
            .iter()
            .any(|m| m.content.contains("Summary of earlier conversation")),
        "reattached session must carry the L2 summary"
    );
}

// ─── Profile selection ────────────────────────────────────────────────────────

#[tokio::test]
async fn profile_change_applies_to_new_sessions_only() {
    let store = store().await;
    let manager = MemoryManager::new(&conversational_config()).with_store(store);
    let first = manager.get_or_create_session("a", None, None).await.unwrap();
    assert_eq!(first.memory.lock().await.profile().max_l1_messages, 12);

    manager.set_compression_profile(CompressionProfile::data_intensive());
    let second = manager.get_or_create_session("b", None, None).await.unwrap();
    assert_eq!(second.memory.lock().await.profile().max_l1_messages, 8);
    // The first session keeps its original tuning.
    assert_eq!(first.memory.lock().await.profile().max_l1_messages, 12);
}
