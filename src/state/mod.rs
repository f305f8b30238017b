// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod mutation;
pub mod ledger;

pub use ledger::{DedupEntry, LedgerState, TimelineFilter};
pub use mutation::LedgerMutation;
