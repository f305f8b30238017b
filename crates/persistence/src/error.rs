// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use canon_kernel::KernelError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid magic bytes in header")]
    InvalidMagic,
    #[error("Unsupported journal version {0}")]
    UnsupportedVersion(u32),
    #[error("Checksum mismatch at frame {seq}: expected {expected}, found {found}")]
    ChecksumMismatch {
        seq: u64,
        expected: u64,
        found: u64,
    },
    #[error("Frame sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
    #[error("Journal truncated inside frame {seq}")]
    Truncated { seq: u64 },
    #[error("Frame {seq} claims {len} bytes, limit is {max}")]
    FrameTooLarge { seq: u64, len: u32, max: u32 },
    #[error("Journal {path} refuses writes after a failed append could not be rolled back")]
    Poisoned { path: String },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to encode mutation: {0}")]
    Encode(String),
    #[error("Failed to decode frame {seq}: {reason}")]
    Decode { seq: u64, reason: String },
    #[error("Replay rejected frame {seq}: {source}")]
    Replay { seq: u64, source: KernelError },
    #[error("Ledger rule violated: {0}")]
    Kernel(#[from] KernelError),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
