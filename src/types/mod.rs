// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod id;
pub mod enums;
pub mod time;
pub mod cursor;

pub use cursor::{Page, TimelineCursor};
pub use enums::{EventType, Rank, Scope};
pub use id::{ChainId, EventId, ProgressionId, StorylineId, UserId};
pub use time::Timestamp;
