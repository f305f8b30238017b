// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};

pub const MILLIS_PER_DAY: u64 = 86_400_000;

/// Milliseconds since the Unix epoch. The store assigns these; the kernel never reads a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn millis(&self) -> u64 {
        self.0
    }

    pub fn saturating_sub_days(&self, days: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(days.saturating_mul(MILLIS_PER_DAY)))
    }

    pub fn saturating_sub_secs(&self, secs: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(secs.saturating_mul(1000)))
    }
}
