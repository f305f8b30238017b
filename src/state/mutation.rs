// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger mutations: the only way ledger state changes.
//!
//! The store builds a mutation after checking its preconditions, journals it,
//! then applies it. Replaying the journal applies the same mutations in the
//! same order and must land on the same state.

use serde::{Deserialize, Serialize};

use crate::chain::CanonicalChain;
use crate::event::CanonEvent;
use crate::storyline::{StampStoryline, StorylineProgression};
use crate::types::enums::Scope;
use crate::types::id::EventId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerMutation {
    /// A new canon event, with the dedup key it was recorded under.
    EventAppended {
        event: CanonEvent,
        dedup_key: Option<String>,
    },

    /// The one field of an event that may change after persistence.
    ScopeChanged { event_id: EventId, scope: Scope },

    /// Verdict from the external trust-verification step.
    VerdictRecorded { event_id: EventId, verified: bool },

    /// Flavor text from the enrichment collaborator.
    CommentaryAttached { event_id: EventId, text: String },

    StorylineOpened { storyline: StampStoryline },

    StorylineAdvanced { progression: StorylineProgression },

    /// Full replacement of a chain record at `chain.revision`.
    ChainWritten { chain: CanonicalChain },

    /// The open -> sealed write together with its `chain-sealed` event.
    /// One frame, so a seal is never stored without its broadcast.
    ChainSealed {
        chain: CanonicalChain,
        event: CanonEvent,
        dedup_key: Option<String>,
    },
}

impl LedgerMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerMutation::EventAppended { .. } => "EventAppended",
            LedgerMutation::ScopeChanged { .. } => "ScopeChanged",
            LedgerMutation::VerdictRecorded { .. } => "VerdictRecorded",
            LedgerMutation::CommentaryAttached { .. } => "CommentaryAttached",
            LedgerMutation::StorylineOpened { .. } => "StorylineOpened",
            LedgerMutation::StorylineAdvanced { .. } => "StorylineAdvanced",
            LedgerMutation::ChainWritten { .. } => "ChainWritten",
            LedgerMutation::ChainSealed { .. } => "ChainSealed",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let (mutation, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(mutation)
    }
}
