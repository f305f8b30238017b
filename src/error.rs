// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

use crate::types::id::{ChainId, EventId, StorylineId, UserId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Malformed input. Always raised before anything is written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("chain {0} is sealed")]
    AlreadySealed(ChainId),

    #[error("event {0} is already in the chain")]
    DuplicateEvent(EventId),

    #[error("{user} may not place event {event} in their chain")]
    NotOwner { user: UserId, event: EventId },

    #[error("event {0} not found")]
    EventNotFound(EventId),

    #[error("storyline {0} not found")]
    StorylineNotFound(StorylineId),

    #[error("chain {0} not found")]
    ChainNotFound(ChainId),

    /// A mutation would break a ledger invariant. Seen during replay of a
    /// tampered journal or when a store skips its own preconditions.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
pub type Result<T> = KernelResult<T>;
