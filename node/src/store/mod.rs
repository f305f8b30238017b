// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Transactional storage behind the ledger components.
//!
//! Every write method is one atomic mutation: either it is journaled and
//! applied, or nothing changes.

pub mod memory;

use async_trait::async_trait;
use canon_kernel::{
    CanonEvent, CanonicalChain, ChainId, EventId, NewEvent, Page, Scope, StampStoryline, StorylineDefinition,
    StorylineId, StorylineProgression, TimelineCursor, TimelineFilter, Timestamp, UserId,
};

use crate::errors::Result;

pub use memory::MemoryStore;

#[derive(Debug, Clone)]
pub struct StoredAppend {
    pub event: CanonEvent,
    /// True when the dedup key matched and nothing was written.
    pub deduplicated: bool,
}

#[derive(Debug, Clone)]
pub enum CasOutcome {
    Swapped(CanonicalChain),
    /// The stored revision moved on; carries what is stored now.
    Conflict(CanonicalChain),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // --- Events ---

    /// Assign id and timestamp (`max(clock, last + 1)` per owner) and append,
    /// unless `(owner, dedup_key)` was recorded within the window.
    async fn append_event(
        &self,
        event: NewEvent,
        dedup_key: Option<String>,
        clock: Timestamp,
        dedup_window_secs: u64,
    ) -> Result<StoredAppend>;

    async fn event(&self, id: EventId) -> Result<Option<CanonEvent>>;

    /// Committed events with ids above `after`, in commit order.
    async fn events_after(&self, after: EventId, limit: usize) -> Result<Vec<CanonEvent>>;

    async fn last_event_id(&self) -> Result<EventId>;

    async fn list_by_owner(
        &self,
        owner: &UserId,
        filter: &TimelineFilter,
        cursor: Option<TimelineCursor>,
        limit: usize,
    ) -> Result<Page<CanonEvent>>;

    async fn change_scope(&self, id: EventId, scope: Scope) -> Result<CanonEvent>;

    async fn record_verdict(&self, id: EventId, verified: bool) -> Result<()>;

    /// Verified flag per id, in input order. Unknown ids read as unverified.
    async fn verdicts(&self, ids: &[EventId]) -> Result<Vec<bool>>;

    async fn attach_commentary(&self, id: EventId, text: String) -> Result<()>;

    async fn commentary(&self, id: EventId) -> Result<Option<String>>;

    // --- Storylines ---

    /// Open `def` for `owner` if needed and advance it by one stage for
    /// `cause`. `None` when the storyline is complete or already counted `cause`.
    async fn advance_storyline(
        &self,
        owner: &UserId,
        def: &StorylineDefinition,
        cause: &CanonEvent,
        now: Timestamp,
    ) -> Result<Option<StorylineProgression>>;

    async fn storyline(&self, id: StorylineId) -> Result<Option<StampStoryline>>;

    async fn storylines_of(&self, owner: &UserId) -> Result<Vec<StampStoryline>>;

    async fn progressions(&self, id: StorylineId) -> Result<Vec<StorylineProgression>>;

    // --- Chains ---

    async fn chain(&self, id: ChainId) -> Result<Option<CanonicalChain>>;

    async fn chain_of(&self, owner: &UserId) -> Result<Option<CanonicalChain>>;

    /// The owner's chain, created at revision 0 on first use.
    async fn open_chain(&self, owner: &UserId) -> Result<CanonicalChain>;

    /// Resolve ids to events in the given order. Fails on the first unknown id.
    async fn events_by_ids(&self, ids: &[EventId]) -> Result<Vec<CanonEvent>>;

    /// Store `next` only if the stored chain is still at `expected_revision`.
    async fn compare_and_swap_chain(&self, expected_revision: u64, next: CanonicalChain) -> Result<CasOutcome>;

    /// Like `compare_and_swap_chain` for the open -> sealed write, except the
    /// `chain-sealed` event is appended and linked in the same write.
    async fn seal_chain(
        &self,
        expected_revision: u64,
        sealed: CanonicalChain,
        broadcast: NewEvent,
        dedup_key: String,
        clock: Timestamp,
    ) -> Result<CasOutcome>;
}
