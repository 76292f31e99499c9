// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use engram_config::{BudgetConfig, Config, FailureConfig, RetryConfig};
use engram_model::{LlmClient, Message};
use engram_store::{SessionRecord, SessionStore};
use tokio::sync::mpsc;
use tokio::sync::RwLock as AsyncRwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::MemoryError;
use crate::events::{MemoryObserver, MessageEvent};
use crate::failure::FailureTracker;
use crate::memory::{CompactionReport, SegmentedMemory, SystemPromptFn, SNAPSHOT_L2_SUMMARY};
use crate::profile::CompressionProfile;
use crate::recall::{RecallHit, RecallPipeline};
use crate::session::Session;

/// Bounded per-observer queue; overflow drops the newest event with a log
/// line rather than stalling the producer.
const OBSERVER_QUEUE_CAPACITY: usize = 64;

pub type ObserverToken = u64;

struct ObserverHandle {
    token: ObserverToken,
    tx: mpsc::Sender<MessageEvent>,
    _task: JoinHandle<()>,
}

/// Session registry, observer bus, and orchestration surface.
///
/// Multiple independent managers per process are supported and mutually
/// isolated; there is no global state behind this type.
pub struct MemoryManager {
    store: Option<Arc<SessionStore>>,
    llm: Option<Arc<dyn LlmClient>>,
    retry: RetryConfig,
    budget: BudgetConfig,
    failure_config: FailureConfig,
    profile: StdRwLock<CompressionProfile>,
    system_prompt_fn: StdRwLock<Option<Arc<SystemPromptFn>>>,
    sessions: AsyncRwLock<HashMap<String, Arc<Session>>>,
    observers: StdMutex<HashMap<String, Vec<ObserverHandle>>>,
    next_observer_token: AtomicU64,
}

impl MemoryManager {
    pub fn new(config: &Config) -> Self {
        Self {
            store: None,
            llm: None,
            retry: config.retry.clone(),
            budget: config.budget.clone(),
            failure_config: config.failure.clone(),
            profile: StdRwLock::new(CompressionProfile::from_config(&config.memory)),
            system_prompt_fn: StdRwLock::new(None),
            sessions: AsyncRwLock::new(HashMap::new()),
            observers: StdMutex::new(HashMap::new()),
            next_observer_token: AtomicU64::new(1),
        }
    }

    /// Attach the durable store (enables swap, snapshots, and recall).
    pub fn with_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the LLM used for summarization and recall re-ranking.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Profile applied to every subsequently created session memory.
    pub fn set_compression_profile(&self, profile: CompressionProfile) {
        *self.profile.write().unwrap() = profile;
    }

    pub fn compression_profile(&self) -> CompressionProfile {
        self.profile.read().unwrap().clone()
    }

    /// Install the system-prompt producer; existing sessions pick it up on
    /// their next prompt assembly, new sessions at construction.
    pub async fn set_system_prompt_fn(&self, f: Arc<SystemPromptFn>) {
        *self.system_prompt_fn.write().unwrap() = Some(f.clone());
        for session in self.sessions.read().await.values() {
            session.memory.lock().await.set_system_prompt_fn(f.clone());
        }
    }

    // ── Session registry ──────────────────────────────────────────────────────

    /// Fetch or create the session, reattaching persisted state on a miss.
    ///
    /// Agent and parent ids follow first-writer-wins: a second call with
    /// different values returns the same session with the original identity.
    pub async fn get_or_create_session(
        &self,
        id: &str,
        agent_id: Option<&str>,
        parent_session_id: Option<&str>,
    ) -> Result<Arc<Session>, MemoryError> {
        if id.is_empty() {
            return Err(MemoryError::MissingSessionId);
        }
        let existing = self.sessions.read().await.get(id).cloned();
        if let Some(existing) = existing {
            existing.adopt_identity(agent_id, parent_session_id);
            self.persist_identity(&existing).await?;
            return Ok(existing);
        }

        // Build (and possibly reattach) outside the write lock; a racing
        // creator is resolved by the entry check below; first insert wins.
        let fresh = self.build_session(id).await?;
        let session = {
            let mut map = self.sessions.write().await;
            map.entry(id.to_string())
                .or_insert_with(|| Arc::new(fresh))
                .clone()
        };
        session.adopt_identity(agent_id, parent_session_id);
        self.persist_identity(&session).await?;
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop a session from the live registry (its durable rows remain).
    pub async fn evict_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Construct a fresh `SegmentedMemory` + `FailureTracker` pair, replaying
    /// the persisted tail and latest L2 snapshot when a store is attached.
    /// The reconstruction is deterministic: a reloaded session is
    /// observationally identical to one that never restarted.
    async fn build_session(&self, id: &str) -> Result<Session, MemoryError> {
        let profile = self.compression_profile();
        let mut memory = SegmentedMemory::new(id, profile.clone(), self.budget.clone());
        if let Some(store) = &self.store {
            memory = memory.with_store(store.clone());
        }
        if let Some(llm) = &self.llm {
            memory = memory.with_summarizer(llm.clone(), self.retry.clone());
        }
        let prompt_fn = self.system_prompt_fn.read().unwrap().clone();
        if let Some(f) = prompt_fn {
            memory = memory.with_system_prompt_fn(f);
        }

        if let Some(store) = &self.store {
            if store.load_session(id).await?.is_some() {
                let tail = store.load_message_tail(id, profile.max_l1_messages).await?;
                let summary = store.latest_memory_snapshot(id, SNAPSHOT_L2_SUMMARY).await?;
                debug!(
                    session_id = %id,
                    replayed = tail.len(),
                    has_summary = summary.is_some(),
                    "reattached persisted session state"
                );
                memory.reattach(tail.into_iter().map(|m| m.message).collect(), summary);
            }
        }

        Ok(Session::new(
            id,
            memory,
            FailureTracker::new(&self.failure_config),
        ))
    }

    /// Sync the session row's identity columns with the live session,
    /// creating the row on first contact.  Counters are left untouched.
    async fn persist_identity(&self, session: &Session) -> Result<(), MemoryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        match store.load_session(&session.id).await? {
            None => {
                let mut record = SessionRecord::new(session.id.clone());
                record.agent_id = session.agent_id();
                record.parent_session_id = session.parent_session_id();
                store.save_session(&record).await?;
            }
            Some(mut record) => {
                let agent = session.agent_id();
                let parent = session.parent_session_id();
                if record.agent_id != agent || record.parent_session_id != parent {
                    record.agent_id = agent;
                    record.parent_session_id = parent;
                    store.save_session(&record).await?;
                }
            }
        }
        Ok(())
    }

    // ── Message flow ──────────────────────────────────────────────────────────

    /// Append a message to the session (persist + L1 + compression) and
    /// notify the owning agent's observers.
    pub async fn add_message(
        &self,
        session_id: &str,
        message: Message,
    ) -> Result<Option<CompactionReport>, MemoryError> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        let report = {
            let mut memory = session.memory.lock().await;
            memory.add_message(message.clone()).await?
        };
        self.notify_observers(&session, message);
        Ok(report)
    }

    // ── Observer bus ──────────────────────────────────────────────────────────

    /// Register an observer for every session owned by `agent_id`.  Each
    /// observer gets its own bounded queue and consumer task, so one slow
    /// observer cannot stall writers or its peers.
    pub fn register_observer(
        &self,
        agent_id: &str,
        observer: Arc<dyn MemoryObserver>,
    ) -> ObserverToken {
        let token = self.next_observer_token.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<MessageEvent>(OBSERVER_QUEUE_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                observer.on_message(event).await;
            }
        });
        self.observers
            .lock()
            .unwrap()
            .entry(agent_id.to_string())
            .or_default()
            .push(ObserverHandle {
                token,
                tx,
                _task: task,
            });
        token
    }

    /// Remove an observer; its consumer task drains and exits once the
    /// queue closes.  Returns false when the token is unknown.
    pub fn unregister_observer(&self, token: ObserverToken) -> bool {
        let mut observers = self.observers.lock().unwrap();
        for handles in observers.values_mut() {
            let before = handles.len();
            handles.retain(|h| h.token != token);
            if handles.len() != before {
                return true;
            }
        }
        false
    }

    pub fn observer_count(&self, agent_id: &str) -> usize {
        self.observers
            .lock()
            .unwrap()
            .get(agent_id)
            .map_or(0, |v| v.len())
    }

    /// Fire-and-forget broadcast.  Only sessions with a non-empty agent id
    /// participate; a full queue drops the event with a warning.
    fn notify_observers(&self, session: &Session, message: Message) {
        let Some(agent_id) = session.agent_id() else {
            return;
        };
        let observers = self.observers.lock().unwrap();
        let Some(handles) = observers.get(&agent_id) else {
            return;
        };
        for handle in handles {
            let event = MessageEvent {
                session_id: session.id.clone(),
                agent_id: agent_id.clone(),
                message: message.clone(),
            };
            if let Err(e) = handle.tx.try_send(event) {
                warn!(
                    agent_id = %agent_id,
                    session_id = %session.id,
                    error = %e,
                    "observer queue overflow; event dropped"
                );
            }
        }
    }

    // ── Recall ────────────────────────────────────────────────────────────────

    /// The recall pipeline over this manager's store and LLM.  Errors with
    /// `SWAP_NOT_ENABLED` when no durable store is attached.
    pub fn recall_pipeline(&self) -> Result<RecallPipeline, MemoryError> {
        let store = self.store.clone().ok_or(MemoryError::SwapNotEnabled)?;
        Ok(RecallPipeline::new(
            store,
            self.llm.clone(),
            self.retry.clone(),
        ))
    }

    /// `search_conversation`: FTS candidates, optional re-rank, budgeted
    /// promotion.
    pub async fn search_conversation(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
        promote: bool,
    ) -> Result<Vec<RecallHit>, MemoryError> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        self.recall_pipeline()?
            .search(&session, query, limit, promote)
            .await
    }

    /// `recall_conversation`: a raw offset/limit slice of swap, promoted
    /// into the live prompt under the budget check.
    pub async fn recall_conversation(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        let slice = self.recall_pipeline()?.slice(session_id, offset, limit).await?;
        session.memory.lock().await.promote(slice.clone())?;
        Ok(slice)
    }

    /// `clear_recalled_context`: empty the promoted slot.
    pub async fn clear_recalled_context(&self, session_id: &str) -> Result<usize, MemoryError> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        let mut memory = session.memory.lock().await;
        Ok(memory.clear_promoted())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
