// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! ScoreAggregator: reputation numbers re-derived from the log on every read.

use canon_kernel::score::ScoreTally;
use canon_kernel::{EventId, TimelineCursor, TimelineFilter, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::context::OpContext;
use crate::errors::Result;
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub canon_ratio: u8,
    pub streak: u64,
    pub echo_score: u64,
    pub total_events: u64,
    pub canon_events: u64,
    pub window_days: u64,
}

pub struct ScoreAggregator {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl ScoreAggregator {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, page_size: usize) -> Self {
        Self {
            store,
            clock,
            page_size: page_size.max(1),
        }
    }

    pub async fn summary(&self, ctx: &OpContext, owner: &UserId, window_days: u64) -> Result<ScoreSummary> {
        let floor = self.clock.now().saturating_sub_days(window_days);
        let filter = TimelineFilter::default();
        let mut tally = ScoreTally::default();
        let mut cursor: Option<TimelineCursor> = None;

        loop {
            let page = ctx
                .run(self.store.list_by_owner(owner, &filter, cursor, self.page_size))
                .await?;
            let ids: Vec<EventId> = page.items.iter().map(|e| e.id).collect();
            let verified = ctx.run(self.store.verdicts(&ids)).await?;
            for (event, ok) in page.items.iter().zip(verified) {
                tally.observe(event, ok, floor);
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(ScoreSummary {
            canon_ratio: tally.canon_ratio(),
            streak: tally.streak,
            echo_score: tally.echo_score,
            total_events: tally.total_events,
            canon_events: tally.canon_events,
            window_days,
        })
    }

    pub async fn canon_ratio(&self, ctx: &OpContext, owner: &UserId) -> Result<u8> {
        Ok(self.summary(ctx, owner, 0).await?.canon_ratio)
    }

    pub async fn streak(&self, ctx: &OpContext, owner: &UserId, window_days: u64) -> Result<u64> {
        Ok(self.summary(ctx, owner, window_days).await?.streak)
    }

    pub async fn echo_score(&self, ctx: &OpContext, owner: &UserId) -> Result<u64> {
        Ok(self.summary(ctx, owner, 0).await?.echo_score)
    }
}
