// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-memory transactional store with an optional durable journal.
//!
//! Write path, under one write lock:
//! 1. build the mutation and `check` it against current state
//! 2. append + fsync the journal frame
//! 3. apply it in memory
//!
//! A failed journal write leaves memory untouched.

use async_trait::async_trait;
use canon_kernel::{
    CanonEvent, CanonicalChain, ChainId, EventId, LedgerMutation, LedgerState, NewEvent, Page, Scope,
    StampStoryline, StorylineDefinition, StorylineId, StorylineProgression, TimelineCursor, TimelineFilter,
    Timestamp, UserId,
};
use canon_persistence::JournalWriter;
use std::path::Path;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::errors::{LedgerError, Result};
use crate::store::{CasOutcome, LedgerStore, StoredAppend};

struct Inner {
    state: LedgerState,
    journal: Option<JournalWriter>,
}

impl Inner {
    fn commit(&mut self, mutation: LedgerMutation) -> Result<()> {
        self.state.check(&mutation)?;

        if let Some(journal) = self.journal.as_mut() {
            journal.append_mutation(&mutation)?;
        }

        self.state.apply(&mutation).map_err(|e| {
            // Checked above under the same lock; reaching this means the
            // journal now holds a frame memory does not.
            tracing::error!("Mutation {} failed after journaling: {}", mutation.kind(), e);
            LedgerError::Storage(e.to_string())
        })
    }
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Volatile store; state is lost on drop.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: LedgerState::new(),
                journal: None,
            }),
        }
    }

    /// Replay the journal at `path` (if any) and keep appending to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let start = Instant::now();

        let state = if path.exists() {
            canon_persistence::replay(path)?
        } else {
            LedgerState::new()
        };
        let journal = JournalWriter::open(path)?;

        tracing::info!(
            "Journal {:?} replayed: {} mutations, {} events in {:?}",
            path,
            state.applied(),
            state.event_count(),
            start.elapsed()
        );

        Ok(Self {
            inner: RwLock::new(Inner {
                state,
                journal: Some(journal),
            }),
        })
    }

    /// Read-only access to the whole state, for tooling and tests.
    pub async fn with_state<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> T {
        let inner = self.inner.read().await;
        f(&inner.state)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_event(
        &self,
        event: NewEvent,
        dedup_key: Option<String>,
        clock: Timestamp,
        dedup_window_secs: u64,
    ) -> Result<StoredAppend> {
        let mut inner = self.inner.write().await;

        if let Some(key) = dedup_key.as_deref() {
            if let Some(original) = inner.state.dedup_hit(&event.owner_id, key, clock, dedup_window_secs) {
                if let Some(existing) = inner.state.event(original) {
                    return Ok(StoredAppend {
                        event: existing.clone(),
                        deduplicated: true,
                    });
                }
            }
        }

        let id = inner.state.next_event_id();
        let timestamp = inner.state.next_timestamp(&event.owner_id, clock);
        let event = event.into_event(id, timestamp);
        inner.commit(LedgerMutation::EventAppended {
            event: event.clone(),
            dedup_key,
        })?;

        Ok(StoredAppend {
            event,
            deduplicated: false,
        })
    }

    async fn event(&self, id: EventId) -> Result<Option<CanonEvent>> {
        Ok(self.inner.read().await.state.event(id).cloned())
    }

    async fn events_after(&self, after: EventId, limit: usize) -> Result<Vec<CanonEvent>> {
        Ok(self.inner.read().await.state.events_after(after, limit))
    }

    async fn last_event_id(&self) -> Result<EventId> {
        Ok(self.inner.read().await.state.last_event_id())
    }

    async fn list_by_owner(
        &self,
        owner: &UserId,
        filter: &TimelineFilter,
        cursor: Option<TimelineCursor>,
        limit: usize,
    ) -> Result<Page<CanonEvent>> {
        Ok(self.inner.read().await.state.timeline(owner, filter, cursor, limit))
    }

    async fn change_scope(&self, id: EventId, scope: Scope) -> Result<CanonEvent> {
        let mut inner = self.inner.write().await;
        inner.commit(LedgerMutation::ScopeChanged { event_id: id, scope })?;
        inner
            .state
            .event(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("event {}", id)))
    }

    async fn record_verdict(&self, id: EventId, verified: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.state.verdict(id) == Some(verified) {
            return Ok(());
        }
        inner.commit(LedgerMutation::VerdictRecorded { event_id: id, verified })
    }

    async fn verdicts(&self, ids: &[EventId]) -> Result<Vec<bool>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().map(|id| inner.state.is_verified(*id)).collect())
    }

    async fn attach_commentary(&self, id: EventId, text: String) -> Result<()> {
        self.inner
            .write()
            .await
            .commit(LedgerMutation::CommentaryAttached { event_id: id, text })
    }

    async fn commentary(&self, id: EventId) -> Result<Option<String>> {
        Ok(self.inner.read().await.state.commentary(id).map(str::to_string))
    }

    async fn advance_storyline(
        &self,
        owner: &UserId,
        def: &StorylineDefinition,
        cause: &CanonEvent,
        now: Timestamp,
    ) -> Result<Option<StorylineProgression>> {
        let mut inner = self.inner.write().await;

        let existing = inner.state.storyline_for(owner, &def.storyline_type).cloned();
        let storyline = match existing {
            Some(existing) => existing,
            None => {
                let opened = StampStoryline::open(inner.state.next_storyline_id(), owner.clone(), def)?;
                inner.commit(LedgerMutation::StorylineOpened {
                    storyline: opened.clone(),
                })?;
                tracing::debug!("Opened storyline {} '{}' for {}", opened.id, opened.storyline_type, owner);
                opened
            }
        };

        if inner.state.has_progression_for(storyline.id, cause.id) {
            return Ok(None);
        }
        let progression = match storyline.next_progression(inner.state.next_progression_id(), cause, now) {
            Some(p) => p,
            None => return Ok(None),
        };
        inner.commit(LedgerMutation::StorylineAdvanced {
            progression: progression.clone(),
        })?;
        Ok(Some(progression))
    }

    async fn storyline(&self, id: StorylineId) -> Result<Option<StampStoryline>> {
        Ok(self.inner.read().await.state.storyline(id).cloned())
    }

    async fn storylines_of(&self, owner: &UserId) -> Result<Vec<StampStoryline>> {
        Ok(self.inner.read().await.state.storylines_of(owner).cloned().collect())
    }

    async fn progressions(&self, id: StorylineId) -> Result<Vec<StorylineProgression>> {
        let inner = self.inner.read().await;
        if inner.state.storyline(id).is_none() {
            return Err(LedgerError::NotFound(format!("storyline {}", id)));
        }
        Ok(inner.state.progressions(id).to_vec())
    }

    async fn chain(&self, id: ChainId) -> Result<Option<CanonicalChain>> {
        Ok(self.inner.read().await.state.chain(id).cloned())
    }

    async fn chain_of(&self, owner: &UserId) -> Result<Option<CanonicalChain>> {
        Ok(self.inner.read().await.state.chain_of(owner).cloned())
    }

    async fn open_chain(&self, owner: &UserId) -> Result<CanonicalChain> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.state.chain_of(owner) {
            return Ok(existing.clone());
        }
        let chain = CanonicalChain::open(inner.state.next_chain_id(), owner.clone());
        inner.commit(LedgerMutation::ChainWritten { chain: chain.clone() })?;
        tracing::debug!("Opened chain {} for {}", chain.id, owner);
        Ok(chain)
    }

    async fn events_by_ids(&self, ids: &[EventId]) -> Result<Vec<CanonEvent>> {
        let inner = self.inner.read().await;
        ids.iter()
            .map(|id| {
                inner
                    .state
                    .event(*id)
                    .cloned()
                    .ok_or_else(|| LedgerError::NotFound(format!("event {}", id)))
            })
            .collect()
    }

    async fn compare_and_swap_chain(&self, expected_revision: u64, next: CanonicalChain) -> Result<CasOutcome> {
        let mut inner = self.inner.write().await;
        let current = inner
            .state
            .chain_of(&next.owner_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("chain {}", next.id)))?;

        if current.revision != expected_revision {
            return Ok(CasOutcome::Conflict(current));
        }
        inner.commit(LedgerMutation::ChainWritten { chain: next.clone() })?;
        Ok(CasOutcome::Swapped(next))
    }

    async fn seal_chain(
        &self,
        expected_revision: u64,
        mut sealed: CanonicalChain,
        broadcast: NewEvent,
        dedup_key: String,
        clock: Timestamp,
    ) -> Result<CasOutcome> {
        let mut inner = self.inner.write().await;
        let current = inner
            .state
            .chain_of(&sealed.owner_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("chain {}", sealed.id)))?;

        if current.revision != expected_revision || current.is_complete {
            return Ok(CasOutcome::Conflict(current));
        }

        let id = inner.state.next_event_id();
        let timestamp = inner.state.next_timestamp(&broadcast.owner_id, clock);
        let event = broadcast.into_event(id, timestamp);
        sealed.seal_event_id = Some(event.id);
        inner.commit(LedgerMutation::ChainSealed {
            chain: sealed.clone(),
            event,
            dedup_key: Some(dedup_key),
        })?;
        Ok(CasOutcome::Swapped(sealed))
    }
}
