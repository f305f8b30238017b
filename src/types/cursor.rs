// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Timeline pagination.
//!
//! Pages are reverse-chronological. The cursor is the `(timestamp, id)` of the
//! last item handed out; the next page starts strictly below it. Because ids
//! are unique the composite key is a total order, so pagination is stable even
//! when two owners' events share a timestamp.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::types::id::EventId;
use crate::types::time::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimelineCursor {
    pub timestamp: Timestamp,
    pub event_id: EventId,
}

impl TimelineCursor {
    pub fn new(timestamp: Timestamp, event_id: EventId) -> Self {
        Self { timestamp, event_id }
    }

    /// True if an item with this key belongs on a page after the cursor.
    pub fn admits(&self, timestamp: Timestamp, event_id: EventId) -> bool {
        (timestamp, event_id) < (self.timestamp, self.event_id)
    }
}

impl fmt::Display for TimelineCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.timestamp.0, self.event_id.0)
    }
}

impl FromStr for TimelineCursor {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KernelError::Validation(format!("malformed cursor '{}'", s));
        let (ts, id) = s.split_once('.').ok_or_else(invalid)?;
        let ts = ts.parse::<u64>().map_err(|_| invalid())?;
        let id = id.parse::<u64>().map_err(|_| invalid())?;
        Ok(TimelineCursor::new(Timestamp(ts), EventId(id)))
    }
}

/// One page of results plus the cursor for the next page, if any.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<TimelineCursor>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self { items: Vec::new(), next_cursor: None }
    }
}
