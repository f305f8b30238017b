// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger State definition.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::chain::CanonicalChain;
use crate::error::{KernelError, Result};
use crate::event::CanonEvent;
use crate::state::mutation::LedgerMutation;
use crate::storyline::{StampStoryline, StorylineProgression};
use crate::types::cursor::{Page, TimelineCursor};
use crate::types::enums::{EventType, Rank};
use crate::types::id::{ChainId, EventId, ProgressionId, StorylineId, UserId};
use crate::types::time::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DedupEntry {
    pub event_id: EventId,
    pub recorded_at: Timestamp,
}

/// Narrowing applied to a timeline read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineFilter {
    /// Only these types. Empty means all.
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub min_rank: Option<Rank>,
    /// Subject view: also include events that name the user in `related_ids`.
    #[serde(default)]
    pub include_related: bool,
}

impl TimelineFilter {
    pub fn admits(&self, event: &CanonEvent) -> bool {
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        match self.min_rank {
            Some(min) => event.rank >= min,
            None => true,
        }
    }
}

/// In-memory tables of the ledger plus the rules for changing them.
///
/// Every write goes through `apply`, which validates the whole mutation
/// before touching any table, so a rejected mutation leaves no trace.
#[derive(Default)]
pub struct LedgerState {
    events: BTreeMap<EventId, CanonEvent>,
    by_owner: FxHashMap<UserId, Vec<EventId>>,
    by_related: FxHashMap<UserId, Vec<EventId>>,
    last_timestamp: FxHashMap<UserId, Timestamp>,
    dedup: FxHashMap<(UserId, String), DedupEntry>,
    verdicts: FxHashMap<EventId, bool>,
    commentary: FxHashMap<EventId, String>,

    storylines: BTreeMap<StorylineId, StampStoryline>,
    storyline_index: FxHashMap<(UserId, String), StorylineId>,
    progressions: FxHashMap<StorylineId, Vec<StorylineProgression>>,
    progression_causes: FxHashSet<(StorylineId, EventId)>,

    chains: FxHashMap<UserId, CanonicalChain>,
    chain_owners: FxHashMap<ChainId, UserId>,

    next_event_id: u64,
    next_storyline_id: u64,
    next_progression_id: u64,
    next_chain_id: u64,
    applied: u64,
}

impl LedgerState {
    pub fn new() -> Self {
        Self {
            next_event_id: 1,
            next_storyline_id: 1,
            next_progression_id: 1,
            next_chain_id: 1,
            ..Default::default()
        }
    }

    /// Rebuild state from a journal. Fails closed on the first bad mutation.
    pub fn replay<'a>(mutations: impl IntoIterator<Item = &'a LedgerMutation>) -> Result<Self> {
        let mut state = Self::new();
        for m in mutations {
            state.apply(m)?;
        }
        Ok(state)
    }

    // --- Read APIs ---

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn event(&self, id: EventId) -> Option<&CanonEvent> {
        self.events.get(&id)
    }

    pub fn events(&self) -> impl Iterator<Item = &CanonEvent> {
        self.events.values()
    }

    /// Highest event id assigned so far, `EventId(0)` on an empty ledger.
    pub fn last_event_id(&self) -> EventId {
        EventId(self.next_event_id.saturating_sub(1))
    }

    /// Events committed after `after`, in commit order.
    pub fn events_after(&self, after: EventId, limit: usize) -> Vec<CanonEvent> {
        self.events
            .range(EventId(after.0.saturating_add(1))..)
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Owner's events in append (= chronological) order.
    pub fn events_by_owner<'a>(&'a self, owner: &UserId) -> impl Iterator<Item = &'a CanonEvent> + 'a {
        self.by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.events.get(id))
    }

    pub fn owners(&self) -> impl Iterator<Item = &UserId> {
        self.by_owner.keys()
    }

    pub fn verdict(&self, id: EventId) -> Option<bool> {
        self.verdicts.get(&id).copied()
    }

    pub fn is_verified(&self, id: EventId) -> bool {
        self.verdict(id).unwrap_or(false)
    }

    pub fn commentary(&self, id: EventId) -> Option<&str> {
        self.commentary.get(&id).map(String::as_str)
    }

    pub fn next_event_id(&self) -> EventId {
        EventId(self.next_event_id)
    }

    pub fn next_storyline_id(&self) -> StorylineId {
        StorylineId(self.next_storyline_id)
    }

    pub fn next_progression_id(&self) -> ProgressionId {
        ProgressionId(self.next_progression_id)
    }

    pub fn next_chain_id(&self) -> ChainId {
        ChainId(self.next_chain_id)
    }

    /// Timestamp for the owner's next event: the clock, bumped past the
    /// owner's last event if the clock stalled or stepped back.
    pub fn next_timestamp(&self, owner: &UserId, clock: Timestamp) -> Timestamp {
        match self.last_timestamp.get(owner) {
            Some(last) if clock <= *last => Timestamp(last.0 + 1),
            _ => clock,
        }
    }

    /// Original event for a retried append, if the key is still inside the window.
    pub fn dedup_hit(&self, owner: &UserId, key: &str, now: Timestamp, window_secs: u64) -> Option<EventId> {
        let entry = self.dedup.get(&(owner.clone(), key.to_string()))?;
        if entry.recorded_at >= now.saturating_sub_secs(window_secs) {
            Some(entry.event_id)
        } else {
            None
        }
    }

    /// One reverse-chronological page of the owner's timeline.
    pub fn timeline(
        &self,
        owner: &UserId,
        filter: &TimelineFilter,
        cursor: Option<TimelineCursor>,
        limit: usize,
    ) -> Page<CanonEvent> {
        let mut ids: Vec<EventId> = self.by_owner.get(owner).cloned().unwrap_or_default();
        if filter.include_related {
            if let Some(related) = self.by_related.get(owner) {
                ids.extend(related.iter().copied());
            }
        }

        let mut matched: Vec<&CanonEvent> = ids
            .iter()
            .filter_map(|id| self.events.get(id))
            .filter(|e| filter.admits(e))
            .filter(|e| cursor.map_or(true, |c| c.admits(e.timestamp, e.id)))
            .collect();
        matched.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        matched.dedup_by_key(|e| e.id);

        let limit = limit.max(1);
        let has_more = matched.len() > limit;
        let items: Vec<CanonEvent> = matched.into_iter().take(limit).cloned().collect();
        let next_cursor = if has_more {
            items.last().map(|e| TimelineCursor::new(e.timestamp, e.id))
        } else {
            None
        };
        Page { items, next_cursor }
    }

    pub fn storyline(&self, id: StorylineId) -> Option<&StampStoryline> {
        self.storylines.get(&id)
    }

    pub fn storyline_for(&self, owner: &UserId, storyline_type: &str) -> Option<&StampStoryline> {
        self.storyline_index
            .get(&(owner.clone(), storyline_type.to_string()))
            .and_then(|id| self.storylines.get(id))
    }

    pub fn storylines_of<'a>(&'a self, owner: &'a UserId) -> impl Iterator<Item = &'a StampStoryline> + 'a {
        self.storylines.values().filter(move |s| &s.owner_id == owner)
    }

    pub fn storyline_count(&self) -> usize {
        self.storylines.len()
    }

    pub fn progressions(&self, id: StorylineId) -> &[StorylineProgression] {
        self.progressions.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_progression_for(&self, storyline: StorylineId, event: EventId) -> bool {
        self.progression_causes.contains(&(storyline, event))
    }

    pub fn chain_of(&self, owner: &UserId) -> Option<&CanonicalChain> {
        self.chains.get(owner)
    }

    pub fn chain(&self, id: ChainId) -> Option<&CanonicalChain> {
        self.chain_owners.get(&id).and_then(|owner| self.chains.get(owner))
    }

    pub fn chains(&self) -> impl Iterator<Item = &CanonicalChain> {
        self.chains.values()
    }

    /// Resolve the member events of a chain, in sequence order.
    pub fn chain_members(&self, chain: &CanonicalChain) -> Result<Vec<CanonEvent>> {
        chain
            .sequence
            .iter()
            .map(|id| self.events.get(id).cloned().ok_or(KernelError::EventNotFound(*id)))
            .collect()
    }

    // --- Write Logic ---

    /// Validate `mutation` against the current tables without changing them.
    ///
    /// The store runs this before journaling so a rejected mutation never
    /// reaches disk.
    pub fn check(&self, mutation: &LedgerMutation) -> Result<()> {
        match mutation {
            LedgerMutation::EventAppended { event, .. } => self.check_event(event)?,
            LedgerMutation::ScopeChanged { event_id, .. }
            | LedgerMutation::VerdictRecorded { event_id, .. }
            | LedgerMutation::CommentaryAttached { event_id, .. } => {
                if !self.events.contains_key(event_id) {
                    return Err(KernelError::EventNotFound(*event_id));
                }
            }
            LedgerMutation::StorylineOpened { storyline } => {
                let key = (storyline.owner_id.clone(), storyline.storyline_type.clone());
                if self.storyline_index.contains_key(&key) || self.storylines.contains_key(&storyline.id) {
                    return Err(KernelError::Invariant(format!(
                        "storyline '{}' already open for {}",
                        storyline.storyline_type, storyline.owner_id
                    )));
                }
                if storyline.stage != 0 || storyline.is_complete || storyline.total_stages == 0 {
                    return Err(KernelError::Invariant(format!(
                        "storyline {} must open at stage 0",
                        storyline.id
                    )));
                }
            }
            LedgerMutation::StorylineAdvanced { progression } => {
                self.advanced(progression)?;
            }
            LedgerMutation::ChainWritten { chain } => self.check_chain(chain)?,
            LedgerMutation::ChainSealed { chain, event, .. } => {
                let open = self
                    .chains
                    .get(&chain.owner_id)
                    .ok_or(KernelError::ChainNotFound(chain.id))?;
                if open.is_complete || !chain.is_complete {
                    return Err(KernelError::Invariant(format!(
                        "chain {} must go from open to sealed",
                        chain.id
                    )));
                }
                if event.event_type != EventType::ChainSealed
                    || event.owner_id != chain.owner_id
                    || chain.seal_event_id != Some(event.id)
                {
                    return Err(KernelError::Invariant(format!(
                        "event {} is not the seal broadcast of chain {}",
                        event.id, chain.id
                    )));
                }
                self.check_event(event)?;
                self.check_chain(chain)?;
            }
        }
        Ok(())
    }

    fn check_event(&self, event: &CanonEvent) -> Result<()> {
        if self.events.contains_key(&event.id) || event.id.0 < self.next_event_id {
            return Err(KernelError::Invariant(format!("event id {} reused", event.id)));
        }
        if let Some(last) = self.last_timestamp.get(&event.owner_id) {
            if event.timestamp <= *last {
                return Err(KernelError::Invariant(format!(
                    "event {} timestamp {} not after {} for {}",
                    event.id, event.timestamp.0, last.0, event.owner_id
                )));
            }
        }
        Ok(())
    }

    fn check_chain(&self, chain: &CanonicalChain) -> Result<()> {
        match self.chains.get(&chain.owner_id) {
            Some(current) => current.check_successor(chain)?,
            None => {
                if chain.revision != 0 || self.chain_owners.contains_key(&chain.id) {
                    return Err(KernelError::Invariant(format!(
                        "chain {} must be created at revision 0",
                        chain.id
                    )));
                }
                chain.check_well_formed()?;
            }
        }
        if let Some(missing) = chain.sequence.iter().find(|id| !self.events.contains_key(id)) {
            return Err(KernelError::EventNotFound(*missing));
        }
        Ok(())
    }

    /// The storyline as it stands after `progression`, if the progression is legal.
    fn advanced(&self, progression: &StorylineProgression) -> Result<StampStoryline> {
        let cause = (progression.storyline_id, progression.causing_event_id);
        if self.progression_causes.contains(&cause) {
            return Err(KernelError::Invariant(format!(
                "event {} already advanced storyline {}",
                progression.causing_event_id, progression.storyline_id
            )));
        }
        if !self.events.contains_key(&progression.causing_event_id) {
            return Err(KernelError::EventNotFound(progression.causing_event_id));
        }
        let mut storyline = self
            .storylines
            .get(&progression.storyline_id)
            .cloned()
            .ok_or(KernelError::StorylineNotFound(progression.storyline_id))?;
        storyline.apply_progression(progression)?;
        Ok(storyline)
    }

    pub fn apply(&mut self, mutation: &LedgerMutation) -> Result<()> {
        self.check(mutation)?;
        match mutation {
            LedgerMutation::EventAppended { event, dedup_key } => self.insert_event(event, dedup_key.as_deref()),
            LedgerMutation::ScopeChanged { event_id, scope } => {
                if let Some(event) = self.events.get_mut(event_id) {
                    event.scope = *scope;
                }
            }
            LedgerMutation::VerdictRecorded { event_id, verified } => {
                self.verdicts.insert(*event_id, *verified);
            }
            LedgerMutation::CommentaryAttached { event_id, text } => {
                self.commentary.insert(*event_id, text.clone());
            }
            LedgerMutation::StorylineOpened { storyline } => {
                let key = (storyline.owner_id.clone(), storyline.storyline_type.clone());
                self.next_storyline_id = self.next_storyline_id.max(storyline.id.0 + 1);
                self.storyline_index.insert(key, storyline.id);
                self.storylines.insert(storyline.id, storyline.clone());
            }
            LedgerMutation::StorylineAdvanced { progression } => {
                let storyline = self.advanced(progression)?;
                self.next_progression_id = self.next_progression_id.max(progression.id.0 + 1);
                self.progression_causes
                    .insert((progression.storyline_id, progression.causing_event_id));
                self.progressions
                    .entry(progression.storyline_id)
                    .or_default()
                    .push(progression.clone());
                self.storylines.insert(storyline.id, storyline);
            }
            LedgerMutation::ChainWritten { chain } => self.insert_chain(chain),
            LedgerMutation::ChainSealed { chain, event, dedup_key } => {
                self.insert_event(event, dedup_key.as_deref());
                self.insert_chain(chain);
            }
        }
        self.applied += 1;
        Ok(())
    }

    fn insert_event(&mut self, event: &CanonEvent, dedup_key: Option<&str>) {
        self.next_event_id = event.id.0 + 1;
        self.last_timestamp.insert(event.owner_id.clone(), event.timestamp);
        self.by_owner.entry(event.owner_id.clone()).or_default().push(event.id);
        for related in &event.related_ids {
            self.by_related.entry(related.clone()).or_default().push(event.id);
        }
        if let Some(key) = dedup_key {
            self.dedup.insert(
                (event.owner_id.clone(), key.to_string()),
                DedupEntry { event_id: event.id, recorded_at: event.timestamp },
            );
        }
        self.events.insert(event.id, event.clone());
    }

    fn insert_chain(&mut self, chain: &CanonicalChain) {
        self.next_chain_id = self.next_chain_id.max(chain.id.0 + 1);
        self.chain_owners.insert(chain.id, chain.owner_id.clone());
        self.chains.insert(chain.owner_id.clone(), chain.clone());
    }
}
