// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! canon-kernel: the deterministic core of the Canon Ledger.
//!
//! Events, storylines and canonical chains, the mutation language that is
//! the only way to change them, and the pure scoring rules. No clocks, no
//! I/O; the node supplies both.

pub mod config;
pub mod error;
pub mod types;
pub mod event;
pub mod storyline;
pub mod chain;
pub mod score;
pub mod visibility;
pub mod state;

pub use chain::{CanonicalChain, ChainSummary, PrestigeLadder, PrestigeTier, SealResult};
pub use error::{KernelError, KernelResult};
pub use event::{CanonEvent, EventDraft, NewEvent};
pub use state::{LedgerMutation, LedgerState, TimelineFilter};
pub use storyline::{StampStoryline, StorylineDefinition, StorylineProgression};
pub use types::{ChainId, EventId, EventType, Page, ProgressionId, Rank, Scope, StorylineId, Timestamp, TimelineCursor, UserId};

#[cfg(test)]
pub mod tests;
