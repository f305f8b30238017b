// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod chain;
pub mod inspect;
pub mod scores;
pub mod timeline;
pub mod verify;

/// RFC 3339 rendering of a ledger timestamp (milliseconds since epoch).
pub(crate) fn format_ts(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
