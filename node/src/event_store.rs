// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! EventStore: validated, idempotent appends and owner-scoped reads.

use canon_kernel::config::MAX_DEDUP_KEY_LEN;
use canon_kernel::{CanonEvent, EventDraft, EventId, NewEvent, Page, Scope, TimelineCursor, TimelineFilter, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::context::OpContext;
use crate::errors::{LedgerError, Result};
use crate::signal::SignalHub;
use crate::store::LedgerStore;
use crate::telemetry::{EVENTS_DEDUPLICATED, EVENTS_RECORDED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub id: EventId,
    pub deduplicated: bool,
}

pub struct EventStore {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    signals: SignalHub,
    dedup_window_secs: u64,
}

impl EventStore {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, signals: SignalHub, dedup_window_secs: u64) -> Self {
        Self {
            store,
            clock,
            signals,
            dedup_window_secs,
        }
    }

    pub async fn append(&self, ctx: &OpContext, draft: EventDraft, dedup_key: Option<String>) -> Result<AppendOutcome> {
        let event = draft.validate()?;
        self.append_validated(ctx, event, dedup_key).await
    }

    /// Append an already-typed event. Also the path for ledger-minted events,
    /// which is why reserved types are accepted here.
    pub(crate) async fn append_validated(
        &self,
        ctx: &OpContext,
        event: NewEvent,
        dedup_key: Option<String>,
    ) -> Result<AppendOutcome> {
        if let Some(key) = dedup_key.as_deref() {
            check_dedup_key(key)?;
        }

        let owner = event.owner_id.clone();
        let stored = ctx
            .run(self.store.append_event(event, dedup_key, self.clock.now(), self.dedup_window_secs))
            .await?;

        // Past this point the event is committed; nothing below may fail the call.
        if stored.deduplicated {
            tracing::debug!("Dedup hit for {}: returning {}", owner, stored.event.id);
            metrics::counter!(EVENTS_DEDUPLICATED, 1);
        } else {
            tracing::debug!(
                "Recorded {} ({}) for {} at {}",
                stored.event.id,
                stored.event.event_type,
                owner,
                stored.event.timestamp.0
            );
            metrics::counter!(EVENTS_RECORDED, 1);
            self.signals.notify();
        }

        Ok(AppendOutcome {
            id: stored.event.id,
            deduplicated: stored.deduplicated,
        })
    }

    /// An event was committed outside `append` (the seal broadcast).
    pub(crate) fn committed(&self) {
        metrics::counter!(EVENTS_RECORDED, 1);
        self.signals.notify();
    }

    pub async fn get(&self, ctx: &OpContext, id: EventId) -> Result<Option<CanonEvent>> {
        ctx.run(self.store.event(id)).await
    }

    pub async fn require(&self, ctx: &OpContext, id: EventId) -> Result<CanonEvent> {
        self.get(ctx, id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("event {}", id)))
    }

    /// Reverse-chronological page of the owner's events (or subject view).
    pub async fn list_by_owner(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        filter: &TimelineFilter,
        cursor: Option<TimelineCursor>,
        limit: usize,
    ) -> Result<Page<CanonEvent>> {
        ctx.run(self.store.list_by_owner(owner, filter, cursor, limit)).await
    }

    /// The only post-commit edit. Only the owner may change it.
    pub async fn change_scope(&self, ctx: &OpContext, caller: &UserId, id: EventId, scope: Scope) -> Result<CanonEvent> {
        let event = self.require(ctx, id).await?;
        if &event.owner_id != caller {
            return Err(LedgerError::NotOwner(format!("{} does not own event {}", caller, id)));
        }
        if event.scope == scope {
            return Ok(event);
        }
        let updated = ctx.run(self.store.change_scope(id, scope)).await?;
        tracing::debug!("Event {} scope {} -> {}", id, event.scope, scope);
        Ok(updated)
    }

    pub async fn record_verdict(&self, ctx: &OpContext, id: EventId, verified: bool) -> Result<()> {
        ctx.run(self.store.record_verdict(id, verified)).await?;
        tracing::debug!("Verdict for {}: {}", id, verified);
        Ok(())
    }

    pub async fn commentary(&self, ctx: &OpContext, id: EventId) -> Result<Option<String>> {
        ctx.run(self.store.commentary(id)).await
    }

    pub async fn is_verified(&self, ctx: &OpContext, id: EventId) -> Result<bool> {
        let flags = ctx.run(self.store.verdicts(&[id])).await?;
        Ok(flags.first().copied().unwrap_or(false))
    }
}

fn check_dedup_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(LedgerError::Validation("dedup key must not be blank".into()));
    }
    if key.len() > MAX_DEDUP_KEY_LEN {
        return Err(LedgerError::Validation(format!(
            "dedup key exceeds {} bytes",
            MAX_DEDUP_KEY_LEN
        )));
    }
    Ok(())
}
