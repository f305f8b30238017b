// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! ChainSealer: append, configure and seal a user's canonical chain.
//!
//! Every write is a compare-and-swap on the chain revision. A write that
//! loses to a concurrent append is rebuilt from the fresh copy and tried
//! once more. A seal that loses to another seal is not an error: the loser
//! reports the stored outcome.

use canon_kernel::{
    CanonEvent, CanonicalChain, ChainId, ChainSummary, EventId, KernelError, NewEvent, PrestigeLadder, Rank,
    Scope, SealResult, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::context::OpContext;
use crate::errors::{LedgerError, Result};
use crate::event_store::EventStore;
use crate::store::{CasOutcome, LedgerStore};
use crate::telemetry::CHAINS_SEALED;

const CAS_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum SealOutcome {
    /// This call performed the transition.
    Sealed(SealResult),
    /// Someone else sealed first; this is what they stored.
    AlreadySealed(SealResult),
}

impl SealOutcome {
    pub fn result(&self) -> &SealResult {
        match self {
            SealOutcome::Sealed(r) | SealOutcome::AlreadySealed(r) => r,
        }
    }

    pub fn into_result(self) -> SealResult {
        match self {
            SealOutcome::Sealed(r) | SealOutcome::AlreadySealed(r) => r,
        }
    }

    pub fn won(&self) -> bool {
        matches!(self, SealOutcome::Sealed(_))
    }
}

pub struct ChainSealer {
    store: Arc<dyn LedgerStore>,
    events: Arc<EventStore>,
    clock: Arc<dyn Clock>,
    ladder: PrestigeLadder,
    max_length: usize,
}

impl ChainSealer {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        events: Arc<EventStore>,
        clock: Arc<dyn Clock>,
        ladder: PrestigeLadder,
        max_length: usize,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            ladder,
            max_length,
        }
    }

    pub async fn get(&self, ctx: &OpContext, owner: &UserId) -> Result<ChainSummary> {
        ctx.run(self.store.chain_of(owner))
            .await?
            .map(|c| c.summary())
            .ok_or_else(|| LedgerError::NotFound(format!("no chain for {}", owner)))
    }

    pub async fn append(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        chain_id: Option<ChainId>,
        event_id: EventId,
        note: Option<String>,
    ) -> Result<ChainSummary> {
        let event = self.events.require(ctx, event_id).await?;
        let mut current = self.resolve(ctx, owner, chain_id).await?;

        for attempt in 1..=CAS_ATTEMPTS {
            let mut next = current.clone();
            next.push(&event, note.clone(), self.max_length)
                .map_err(|e| sealed_or(e, &current))?;
            self.rescore(ctx, &mut next).await?;
            next.revision += 1;

            match ctx.run(self.store.compare_and_swap_chain(current.revision, next)).await? {
                CasOutcome::Swapped(stored) => {
                    tracing::debug!(
                        "Chain {} appended {} (len {}, prestige {})",
                        stored.id,
                        event_id,
                        stored.sequence.len(),
                        stored.prestige_score
                    );
                    return Ok(stored.summary());
                }
                CasOutcome::Conflict(fresh) => {
                    tracing::debug!("Chain {} append lost CAS (attempt {})", fresh.id, attempt);
                    current = fresh;
                }
            }
        }
        Err(LedgerError::Storage(format!(
            "chain {} kept changing during append",
            current.id
        )))
    }

    /// Rename or change visibility while the chain is open.
    pub async fn configure(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        title: Option<String>,
        is_public: Option<bool>,
    ) -> Result<ChainSummary> {
        let mut current = ctx.run(self.store.open_chain(owner)).await?;

        for _ in 0..CAS_ATTEMPTS {
            let mut next = current.clone();
            next.ensure_open().map_err(|e| sealed_or(e, &current))?;
            if let Some(t) = title.clone() {
                next.rename(t)?;
            }
            if let Some(p) = is_public {
                next.is_public = p;
            }
            next.revision += 1;

            match ctx.run(self.store.compare_and_swap_chain(current.revision, next)).await? {
                CasOutcome::Swapped(stored) => return Ok(stored.summary()),
                CasOutcome::Conflict(fresh) => current = fresh,
            }
        }
        Err(LedgerError::Storage(format!(
            "chain {} kept changing during configure",
            current.id
        )))
    }

    /// Seal exactly once. The winner appends `final_event_id` (unless it is
    /// already a member), mints the prestige title and commits the
    /// `chain-sealed` event in the same write; every other caller gets
    /// `AlreadySealed` with the stored result.
    pub async fn seal(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        chain_id: ChainId,
        final_event_id: Option<EventId>,
        annotation: Option<String>,
    ) -> Result<SealOutcome> {
        let final_event = match final_event_id {
            Some(id) => Some(self.events.require(ctx, id).await?),
            None => None,
        };
        let mut current = self.resolve(ctx, owner, Some(chain_id)).await?;

        for attempt in 1..=CAS_ATTEMPTS {
            if current.is_complete {
                return Ok(SealOutcome::AlreadySealed(SealResult::from_chain(&current)));
            }

            let (next, members) = self.sealed_copy(ctx, &current, final_event.as_ref(), annotation.clone()).await?;
            let broadcast = seal_broadcast(&next, &members);
            let dedup_key = format!("chain-sealed:{}", next.id);
            let write = self
                .store
                .seal_chain(current.revision, next, broadcast, dedup_key, self.clock.now());

            match ctx.run(write).await? {
                CasOutcome::Swapped(sealed) => {
                    metrics::counter!(CHAINS_SEALED, 1);
                    tracing::info!(
                        "Chain {} sealed by {}: '{}' ({} events, prestige {}, broadcast {:?})",
                        sealed.id,
                        owner,
                        sealed.prestige_title.as_deref().unwrap_or_default(),
                        sealed.sequence.len(),
                        sealed.prestige_score,
                        sealed.seal_event_id
                    );
                    self.events.committed();
                    return Ok(SealOutcome::Sealed(SealResult::from_chain(&sealed)));
                }
                CasOutcome::Conflict(fresh) => {
                    tracing::debug!("Chain {} seal lost CAS (attempt {})", fresh.id, attempt);
                    current = fresh;
                }
            }
        }

        if current.is_complete {
            return Ok(SealOutcome::AlreadySealed(SealResult::from_chain(&current)));
        }
        Err(LedgerError::Storage(format!(
            "chain {} kept changing during seal",
            current.id
        )))
    }

    /// The sealed successor of `current` and its member events.
    async fn sealed_copy(
        &self,
        ctx: &OpContext,
        current: &CanonicalChain,
        final_event: Option<&CanonEvent>,
        annotation: Option<String>,
    ) -> Result<(CanonicalChain, Vec<CanonEvent>)> {
        let mut next = current.clone();
        match final_event {
            Some(event) if next.contains(event.id) => {
                if let Some(note) = annotation.clone() {
                    next.annotate(event.id, note).map_err(|e| sealed_or(e, current))?;
                }
            }
            Some(event) => {
                next.push(event, annotation.clone(), self.max_length)
                    .map_err(|e| sealed_or(e, current))?;
            }
            None => {}
        }
        let members = ctx.run(self.store.events_by_ids(&next.sequence)).await?;
        next.rescore(&members);
        let title = self.ladder.title_for(next.prestige_score, next.sequence.len());
        next.seal(current.owner_id.clone(), annotation, title, self.clock.now())
            .map_err(|e| sealed_or(e, current))?;
        next.revision += 1;
        Ok((next, members))
    }

    async fn resolve(&self, ctx: &OpContext, owner: &UserId, chain_id: Option<ChainId>) -> Result<CanonicalChain> {
        let chain = match chain_id {
            Some(id) => ctx
                .run(self.store.chain(id))
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("chain {}", id)))?,
            None => ctx.run(self.store.open_chain(owner)).await?,
        };
        if &chain.owner_id != owner {
            return Err(LedgerError::NotOwner(format!("{} does not own chain {}", owner, chain.id)));
        }
        Ok(chain)
    }

    async fn rescore(&self, ctx: &OpContext, chain: &mut CanonicalChain) -> Result<()> {
        let members = ctx.run(self.store.events_by_ids(&chain.sequence)).await?;
        chain.rescore(&members);
        Ok(())
    }
}

/// The `chain-sealed` event for `sealed`: rank of its strongest member
/// (at least regional), visible where the chain is.
fn seal_broadcast(sealed: &CanonicalChain, members: &[CanonEvent]) -> NewEvent {
    let top_rank = members.iter().map(|e| e.rank).max().unwrap_or(Rank::Local);
    let scope = if sealed.is_public { Scope::Public } else { Scope::Connections };
    NewEvent::chain_sealed(
        sealed.owner_id.clone(),
        format!(
            "{} sealed: {}",
            sealed.title,
            sealed.prestige_title.as_deref().unwrap_or_default()
        ),
        sealed.completion_note.clone().unwrap_or_default(),
        top_rank,
        scope,
        0,
    )
}

fn sealed_or(err: KernelError, chain: &CanonicalChain) -> LedgerError {
    match err {
        KernelError::AlreadySealed(_) => LedgerError::AlreadySealed(Box::new(chain.summary())),
        other => other.into(),
    }
}
