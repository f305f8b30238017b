// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod error;
pub mod journal;
pub mod fixtures;

pub use error::{PersistenceError, Result};
pub use journal::{read_mutations, replay, Frame, FrameHeader, JournalHeader, JournalReader, JournalSink, JournalWriter};
