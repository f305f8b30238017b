// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reputation metrics.
//!
//! Pure functions over a slice of the log. No counters are cached anywhere;
//! the node re-scans the owner's events and folds them through here, so the
//! numbers can never drift from the log.

use serde::{Deserialize, Serialize};

use crate::event::CanonEvent;
use crate::types::time::Timestamp;

/// Running totals for one owner, folded page by page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTally {
    pub total_events: u64,
    pub canon_events: u64,
    pub streak: u64,
    pub echo_score: u64,
}

impl ScoreTally {
    /// Fold one event in. `verified` is the external trust verdict;
    /// `streak_floor` is the oldest timestamp that still counts toward the streak.
    pub fn observe(&mut self, event: &CanonEvent, verified: bool, streak_floor: Timestamp) {
        self.total_events += 1;
        self.echo_score = self.echo_score.saturating_add(event.echo_score);
        if verified && event.has_stamp() {
            self.canon_events += 1;
        }
        if verified && event.timestamp >= streak_floor {
            self.streak += 1;
        }
    }

    pub fn canon_ratio(&self) -> u8 {
        canon_ratio(self.canon_events, self.total_events)
    }
}

/// `round(100 * canon / total)`, half rounding up. Zero when there are no events.
pub fn canon_ratio(canon: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let canon = canon.min(total) as u128;
    let total = total as u128;
    ((canon * 100 + total / 2) / total) as u8
}

pub fn echo_total<'a>(events: impl IntoIterator<Item = &'a CanonEvent>) -> u64 {
    events
        .into_iter()
        .fold(0u64, |acc, e| acc.saturating_add(e.echo_score))
}

/// Verified events inside the trailing window. A plain count, no day bucketing.
pub fn streak<'a>(
    events: impl IntoIterator<Item = &'a CanonEvent>,
    is_verified: impl Fn(&CanonEvent) -> bool,
    now: Timestamp,
    window_days: u64,
) -> u64 {
    let floor = now.saturating_sub_days(window_days);
    events
        .into_iter()
        .filter(|e| e.timestamp >= floor && is_verified(e))
        .count() as u64
}
