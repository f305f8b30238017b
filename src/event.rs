// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canon Events
//!
//! A `CanonEvent` is an immutable record of a significant, rank-classified
//! user action. Events enter the ledger in three shapes:
//!
//! - `EventDraft`: raw caller input, enums still as strings
//! - `NewEvent`: validated and typed, but without an id or timestamp
//! - `CanonEvent`: persisted, id and timestamp assigned by the store
//!
//! # Invariants
//! - Once persisted, only `scope` may change
//! - `timestamp` is strictly increasing per owner
//! - The owner never appears in its own `related_ids`

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::{MAX_DESCRIPTION_LEN, MAX_RELATED_IDS, MAX_TITLE_LEN};
use crate::error::{KernelError, Result};
use crate::types::enums::{EventType, Rank, Scope};
use crate::types::id::{EventId, UserId};
use crate::types::time::Timestamp;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonEvent {
    pub id: EventId,
    pub owner_id: UserId,
    pub related_ids: BTreeSet<UserId>,
    pub event_type: EventType,
    pub title: String,
    pub description: String,
    pub timestamp: Timestamp,
    pub rank: Rank,
    pub scope: Scope,
    pub source_stamp_id: Option<String>,
    pub echo_score: u64,
}

impl CanonEvent {
    /// True if `user` owns the event or is named in it.
    pub fn involves(&self, user: &UserId) -> bool {
        &self.owner_id == user || self.related_ids.contains(user)
    }

    pub fn has_stamp(&self) -> bool {
        self.source_stamp_id.is_some()
    }
}

/// Caller-supplied input for `recordEvent`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub owner_id: String,
    pub event_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub related_ids: Vec<String>,
    #[serde(default)]
    pub source_stamp_id: Option<String>,
    #[serde(default)]
    pub echo_score: Option<u64>,
}

impl EventDraft {
    pub fn new(owner_id: impl Into<String>, event_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            event_type: event_type.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = Some(rank.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.source_stamp_id = Some(stamp.into());
        self
    }

    pub fn with_echo(mut self, echo: u64) -> Self {
        self.echo_score = Some(echo);
        self
    }

    pub fn with_related(mut self, related: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.related_ids = related.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and type the draft. Rank defaults to `local`, scope to `public`.
    ///
    /// Reserved event types are rejected here; the ledger mints those itself
    /// through `NewEvent::chain_sealed`.
    pub fn validate(self) -> Result<NewEvent> {
        let owner_id = UserId(self.owner_id.trim().to_string());
        if owner_id.is_blank() {
            return Err(KernelError::Validation("owner id is required".into()));
        }

        let event_type: EventType = self.event_type.parse()?;
        if event_type.is_reserved() {
            return Err(KernelError::Validation(format!(
                "event type '{}' is reserved",
                event_type
            )));
        }

        let rank = match self.rank.as_deref() {
            Some(r) => r.parse()?,
            None => Rank::default(),
        };
        let scope = match self.scope.as_deref() {
            Some(s) => s.parse()?,
            None => Scope::default(),
        };

        let mut related_ids = BTreeSet::new();
        for raw in self.related_ids {
            let id = UserId(raw.trim().to_string());
            if id.is_blank() {
                return Err(KernelError::Validation("related id must not be blank".into()));
            }
            if id == owner_id {
                return Err(KernelError::Validation("owner cannot be listed as related".into()));
            }
            related_ids.insert(id);
        }

        let source_stamp_id = match self.source_stamp_id {
            Some(s) if s.trim().is_empty() => {
                return Err(KernelError::Validation("source stamp id must not be blank".into()))
            }
            other => other,
        };

        let event = NewEvent {
            owner_id,
            related_ids,
            event_type,
            title: self.title.trim().to_string(),
            description: self.description.unwrap_or_default(),
            rank,
            scope,
            source_stamp_id,
            echo_score: self.echo_score.unwrap_or(0),
        };
        event.check_bounds()?;
        Ok(event)
    }
}

/// A validated event awaiting id and timestamp assignment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub owner_id: UserId,
    pub related_ids: BTreeSet<UserId>,
    pub event_type: EventType,
    pub title: String,
    pub description: String,
    pub rank: Rank,
    pub scope: Scope,
    pub source_stamp_id: Option<String>,
    pub echo_score: u64,
}

impl NewEvent {
    /// The broadcast minted when a chain is sealed.
    pub fn chain_sealed(
        owner_id: UserId,
        title: String,
        description: String,
        rank: Rank,
        scope: Scope,
        echo_score: u64,
    ) -> Self {
        Self {
            owner_id,
            related_ids: BTreeSet::new(),
            event_type: EventType::ChainSealed,
            title,
            description,
            rank: rank.max(Rank::Regional),
            scope,
            source_stamp_id: None,
            echo_score,
        }
    }

    fn check_bounds(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(KernelError::Validation("title is required".into()));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(KernelError::Validation(format!(
                "title exceeds {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(KernelError::Validation(format!(
                "description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if self.related_ids.len() > MAX_RELATED_IDS {
            return Err(KernelError::Validation(format!(
                "at most {} related ids allowed",
                MAX_RELATED_IDS
            )));
        }
        Ok(())
    }

    pub fn into_event(self, id: EventId, timestamp: Timestamp) -> CanonEvent {
        CanonEvent {
            id,
            owner_id: self.owner_id,
            related_ids: self.related_ids,
            event_type: self.event_type,
            title: self.title,
            description: self.description,
            timestamp,
            rank: self.rank,
            scope: self.scope,
            source_stamp_id: self.source_stamp_id,
            echo_score: self.echo_score,
        }
    }
}
