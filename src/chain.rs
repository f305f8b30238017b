// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical Chains
//!
//! A user-curated, ordered subset of canon events that can be sealed exactly
//! once.
//!
//! # State machine
//! ```text
//! Open --append*--> Open --seal--> Sealed (terminal)
//! ```
//!
//! # Invariants
//! - `sequence` holds unique ids; insertion order is narrative order
//! - every annotation key is a member of `sequence`
//! - `revision` increases by exactly one per stored write
//! - once sealed, the body (sequence, annotations, title, seal fields) is
//!   frozen; the only later write sets `seal_event_id` from `None`
//! - `seal_digest` commits to the frozen body so tooling can prove it

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ANNOTATION_PRESTIGE_BONUS, MAX_NOTE_LEN, MAX_TITLE_LEN, RANK_PRESTIGE_MULTIPLIER};
use crate::error::{KernelError, Result};
use crate::event::CanonEvent;
use crate::types::id::{ChainId, EventId, UserId};
use crate::types::time::Timestamp;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalChain {
    pub id: ChainId,
    pub owner_id: UserId,
    pub title: String,
    pub is_public: bool,
    pub sequence: Vec<EventId>,
    pub prestige_score: u64,
    pub annotations: BTreeMap<EventId, String>,
    pub is_complete: bool,
    pub completed_at: Option<Timestamp>,
    pub sealed_by_user_id: Option<UserId>,
    pub completion_note: Option<String>,
    pub prestige_title: Option<String>,
    pub seal_digest: Option<[u8; 32]>,
    pub seal_event_id: Option<EventId>,
    pub revision: u64,
}

impl CanonicalChain {
    pub fn open(id: ChainId, owner_id: UserId) -> Self {
        let title = format!("{}'s Canon", owner_id);
        Self {
            id,
            owner_id,
            title,
            is_public: true,
            sequence: Vec::new(),
            prestige_score: 0,
            annotations: BTreeMap::new(),
            is_complete: false,
            completed_at: None,
            sealed_by_user_id: None,
            completion_note: None,
            prestige_title: None,
            seal_digest: None,
            seal_event_id: None,
            revision: 0,
        }
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_complete {
            return Err(KernelError::AlreadySealed(self.id));
        }
        Ok(())
    }

    pub fn contains(&self, event_id: EventId) -> bool {
        self.sequence.contains(&event_id)
    }

    /// Ownership rule: the event is the chain owner's, or names them.
    pub fn check_membership(&self, event: &CanonEvent) -> Result<()> {
        if event.owner_id == self.owner_id || event.related_ids.contains(&self.owner_id) {
            Ok(())
        } else {
            Err(KernelError::NotOwner {
                user: self.owner_id.clone(),
                event: event.id,
            })
        }
    }

    /// Append `event`, optionally storing (or overwriting) its annotation.
    ///
    /// Does not touch `prestige_score` or `revision`; callers rescore with
    /// the full member list and bump the revision when they persist.
    pub fn push(&mut self, event: &CanonEvent, note: Option<String>, max_length: usize) -> Result<()> {
        self.ensure_open()?;
        if self.contains(event.id) {
            return Err(KernelError::DuplicateEvent(event.id));
        }
        self.check_membership(event)?;
        if self.sequence.len() >= max_length {
            return Err(KernelError::Validation(format!(
                "chain {} already holds the maximum of {} events",
                self.id, max_length
            )));
        }
        if let Some(ref n) = note {
            check_note(n)?;
        }

        self.sequence.push(event.id);
        if let Some(n) = note {
            self.annotations.insert(event.id, n);
        }
        Ok(())
    }

    /// Store (or overwrite) the note on an event already in the sequence.
    pub fn annotate(&mut self, event_id: EventId, note: String) -> Result<()> {
        self.ensure_open()?;
        if !self.contains(event_id) {
            return Err(KernelError::Validation(format!(
                "event {} is not in chain {}",
                event_id, self.id
            )));
        }
        check_note(&note)?;
        self.annotations.insert(event_id, note);
        Ok(())
    }

    pub fn rename(&mut self, title: String) -> Result<()> {
        self.ensure_open()?;
        let title = title.trim().to_string();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(KernelError::Validation(format!(
                "chain title must be 1..={} characters",
                MAX_TITLE_LEN
            )));
        }
        self.title = title;
        Ok(())
    }

    /// Recompute prestige from the member events (in any order).
    pub fn rescore(&mut self, members: &[CanonEvent]) {
        self.prestige_score = prestige_score(members, self.annotations.len());
    }

    /// Transition Open -> Sealed. Pure; the store decides whether this write wins.
    pub fn seal(
        &mut self,
        sealed_by: UserId,
        completion_note: Option<String>,
        prestige_title: String,
        now: Timestamp,
    ) -> Result<()> {
        self.ensure_open()?;
        if let Some(ref n) = completion_note {
            check_note(n)?;
        }
        self.is_complete = true;
        self.completed_at = Some(now);
        self.sealed_by_user_id = Some(sealed_by);
        self.completion_note = completion_note;
        self.prestige_title = Some(prestige_title);
        self.seal_digest = Some(self.body_digest());
        Ok(())
    }

    /// BLAKE3 over the sealed body: title, sequence, annotations.
    pub fn body_digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.id.0.to_le_bytes());
        hasher.update(&(self.title.len() as u64).to_le_bytes());
        hasher.update(self.title.as_bytes());
        hasher.update(&(self.sequence.len() as u64).to_le_bytes());
        for id in &self.sequence {
            hasher.update(&id.0.to_le_bytes());
        }
        hasher.update(&(self.annotations.len() as u64).to_le_bytes());
        for (id, note) in &self.annotations {
            hasher.update(&id.0.to_le_bytes());
            hasher.update(&(note.len() as u64).to_le_bytes());
            hasher.update(note.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    /// Structural checks that hold for every stored revision.
    pub fn check_well_formed(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for id in &self.sequence {
            if !seen.insert(*id) {
                return Err(KernelError::Invariant(format!(
                    "chain {} lists {} twice",
                    self.id, id
                )));
            }
        }
        if let Some(stray) = self.annotations.keys().find(|k| !seen.contains(k)) {
            return Err(KernelError::Invariant(format!(
                "chain {} annotates {} which is not in its sequence",
                self.id, stray
            )));
        }
        if self.is_complete {
            if self.completed_at.is_none() || self.prestige_title.is_none() {
                return Err(KernelError::Invariant(format!(
                    "chain {} is sealed without seal metadata",
                    self.id
                )));
            }
            if self.seal_digest != Some(self.body_digest()) {
                return Err(KernelError::Invariant(format!(
                    "chain {} body does not match its seal digest",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Decide whether `next` may replace `self` in the store.
    pub fn check_successor(&self, next: &CanonicalChain) -> Result<()> {
        if next.id != self.id || next.owner_id != self.owner_id {
            return Err(KernelError::Invariant(format!(
                "chain {} cannot be replaced by chain {}",
                self.id, next.id
            )));
        }
        if next.revision != self.revision + 1 {
            return Err(KernelError::Invariant(format!(
                "chain {} revision {} does not follow {}",
                self.id, next.revision, self.revision
            )));
        }
        if self.is_complete {
            let mut frozen = self.clone();
            frozen.revision = next.revision;
            if self.seal_event_id.is_none() {
                frozen.seal_event_id = next.seal_event_id;
            }
            if &frozen != next {
                return Err(KernelError::AlreadySealed(self.id));
            }
        }
        next.check_well_formed()
    }

    pub fn summary(&self) -> ChainSummary {
        ChainSummary::from(self)
    }
}

fn check_note(note: &str) -> Result<()> {
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(KernelError::Validation(format!(
            "note exceeds {} characters",
            MAX_NOTE_LEN
        )));
    }
    Ok(())
}

/// Prestige: rank weight x 10 plus echo per member, plus a flat bonus per annotation.
///
/// Deterministic and re-derivable from the sequence and its annotations.
pub fn prestige_score(members: &[CanonEvent], annotation_count: usize) -> u64 {
    let base: u64 = members
        .iter()
        .map(|e| {
            e.rank
                .prestige_weight()
                .saturating_mul(RANK_PRESTIGE_MULTIPLIER)
                .saturating_add(e.echo_score)
        })
        .fold(0u64, |acc, v| acc.saturating_add(v));
    base.saturating_add((annotation_count as u64).saturating_mul(ANNOTATION_PRESTIGE_BONUS))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrestigeTier {
    pub title: String,
    pub min_score: u64,
    pub min_length: usize,
}

/// Ordered title thresholds. The first tier whose score and length minimums
/// are both met names the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrestigeLadder {
    pub tiers: Vec<PrestigeTier>,
    pub fallback: String,
}

impl PrestigeLadder {
    pub fn title_for(&self, score: u64, length: usize) -> String {
        let mut tiers: Vec<&PrestigeTier> = self.tiers.iter().collect();
        tiers.sort_by(|a, b| b.min_score.cmp(&a.min_score).then(b.min_length.cmp(&a.min_length)));
        tiers
            .into_iter()
            .find(|t| score >= t.min_score && length >= t.min_length)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for PrestigeLadder {
    fn default() -> Self {
        let tier = |title: &str, min_score, min_length| PrestigeTier {
            title: title.to_string(),
            min_score,
            min_length,
        };
        Self {
            tiers: vec![
                tier("Legend of the Canon", 500, 10),
                tier("Keeper of the Canon", 200, 6),
                tier("Chronicler", 80, 3),
                tier("Initiate", 1, 1),
            ],
            fallback: "Unwritten".to_string(),
        }
    }
}

/// Read model handed to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub id: ChainId,
    pub owner_id: UserId,
    pub title: String,
    pub is_public: bool,
    pub sequence: Vec<EventId>,
    pub annotations: BTreeMap<EventId, String>,
    pub prestige_score: u64,
    pub is_complete: bool,
    pub completed_at: Option<Timestamp>,
    pub sealed_by_user_id: Option<UserId>,
    pub completion_note: Option<String>,
    pub prestige_title: Option<String>,
    pub seal_digest: Option<String>,
    pub revision: u64,
}

impl From<&CanonicalChain> for ChainSummary {
    fn from(c: &CanonicalChain) -> Self {
        Self {
            id: c.id,
            owner_id: c.owner_id.clone(),
            title: c.title.clone(),
            is_public: c.is_public,
            sequence: c.sequence.clone(),
            annotations: c.annotations.clone(),
            prestige_score: c.prestige_score,
            is_complete: c.is_complete,
            completed_at: c.completed_at,
            sealed_by_user_id: c.sealed_by_user_id.clone(),
            completion_note: c.completion_note.clone(),
            prestige_title: c.prestige_title.clone(),
            seal_digest: c.seal_digest.map(hex::encode),
            revision: c.revision,
        }
    }
}

/// Outcome of `sealChain`, identical for every caller once the chain is sealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealResult {
    pub chain_id: ChainId,
    pub is_complete: bool,
    pub prestige_title: String,
    pub broadcast_created: bool,
}

impl SealResult {
    pub fn from_chain(chain: &CanonicalChain) -> Self {
        Self {
            chain_id: chain.id,
            is_complete: chain.is_complete,
            prestige_title: chain.prestige_title.clone().unwrap_or_default(),
            broadcast_created: chain.seal_event_id.is_some(),
        }
    }
}
