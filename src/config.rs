// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Maximum length of an event title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum length of an event description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 4000;

/// Maximum number of users an event may reference.
pub const MAX_RELATED_IDS: usize = 64;

/// Maximum length of a chain annotation or completion note.
pub const MAX_NOTE_LEN: usize = 1000;

/// Maximum length of a client dedup key.
pub const MAX_DEDUP_KEY_LEN: usize = 128;

/// Default number of events a canonical chain may hold.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 256;

/// Default dedup window for `recordEvent` retries (24h).
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 86_400;

/// Points per annotated event when scoring chain prestige.
pub const ANNOTATION_PRESTIGE_BONUS: u64 = 5;

/// Multiplier applied to a rank weight when scoring chain prestige.
pub const RANK_PRESTIGE_MULTIPLIER: u64 = 10;
