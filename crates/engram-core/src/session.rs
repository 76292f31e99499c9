// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::failure::FailureTracker;
use crate::memory::SegmentedMemory;

#[derive(Debug, Default)]
struct SessionMeta {
    agent_id: Option<String>,
    parent_session_id: Option<String>,
}

/// One live conversation session.
///
/// Owned solely by the manager's registry; everything else refers to the
/// session by id.  The memory and failure tracker are runtime behavior, not
/// state; they are rebuilt from the store on reload, never persisted.
pub struct Session {
    pub id: String,
    meta: RwLock<SessionMeta>,
    /// Guards the segmented memory across its async compaction points.
    pub memory: AsyncMutex<SegmentedMemory>,
    /// Failure bookkeeping; plain mutex, never held across an await.
    pub failures: Mutex<FailureTracker>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: impl Into<String>, memory: SegmentedMemory, failures: FailureTracker) -> Self {
        Self {
            id: id.into(),
            meta: RwLock::new(SessionMeta::default()),
            memory: AsyncMutex::new(memory),
            failures: Mutex::new(failures),
            created_at: Utc::now(),
        }
    }

    pub fn agent_id(&self) -> Option<String> {
        self.meta.read().unwrap().agent_id.clone()
    }

    pub fn parent_session_id(&self) -> Option<String> {
        self.meta.read().unwrap().parent_session_id.clone()
    }

    /// Adopt agent/parent identity with first-writer-wins semantics: values
    /// already set are never overwritten; later callers see the originals.
    pub(crate) fn adopt_identity(&self, agent_id: Option<&str>, parent: Option<&str>) {
        let mut meta = self.meta.write().unwrap();
        if meta.agent_id.is_none() {
            if let Some(a) = agent_id {
                if !a.is_empty() {
                    meta.agent_id = Some(a.to_string());
                }
            }
        }
        if meta.parent_session_id.is_none() {
            if let Some(p) = parent {
                if !p.is_empty() {
                    meta.parent_session_id = Some(p.to_string());
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
