// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Helpers shared by the kernel tests.

use crate::event::{CanonEvent, EventDraft};
use crate::state::{LedgerMutation, LedgerState};
use crate::types::id::UserId;
use crate::types::time::Timestamp;

/// Append a validated draft the way a store would: next id, monotonic timestamp.
pub fn append(state: &mut LedgerState, draft: EventDraft, clock: u64) -> CanonEvent {
    let new_event = draft.validate().unwrap();
    let id = state.next_event_id();
    let ts = state.next_timestamp(&new_event.owner_id, Timestamp(clock));
    let event = new_event.into_event(id, ts);
    state
        .apply(&LedgerMutation::EventAppended { event: event.clone(), dedup_key: None })
        .unwrap();
    event
}

pub fn verify(state: &mut LedgerState, event: &CanonEvent) {
    state
        .apply(&LedgerMutation::VerdictRecorded { event_id: event.id, verified: true })
        .unwrap();
}

pub fn user(id: &str) -> UserId {
    UserId::from(id)
}
