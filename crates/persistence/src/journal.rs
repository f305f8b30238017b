// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-Only Ledger Journal
//!
//! This is the durability layer under the node's store.
//! - Frames are written and fsync'd BEFORE the in-memory apply
//! - No rewriting; the only truncation drops a frame whose own append failed
//! - Payloads are bincode-encoded `LedgerMutation`s
//!
//! # File Format
//! ```text
//! [Header: 16 bytes][Frame][Frame][Frame]...
//! ```
//!
//! Header: magic `CANONLOG` (8) | version u32 (1) | reserved u32 (0)
//!
//! Frame: seq u64 | payload_len u32 | crc64 u64 | payload
//!
//! Sequence numbers start at 0 and have no gaps. A checksum mismatch, a
//! gap, or a frame cut short by a crash all fail closed.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use canon_kernel::{LedgerMutation, LedgerState};
use crc64fast::Digest;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{PersistenceError, Result};

/// Upper bound on one encoded mutation. Guards replay against a corrupt length field.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub reserved: u32,
}

impl JournalHeader {
    pub const SIZE: usize = 16;
    pub const MAGIC: [u8; 8] = *b"CANONLOG";
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            reserved: 0,
        }
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.reserved)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(PersistenceError::InvalidMagic);
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != Self::VERSION {
            return Err(PersistenceError::UnsupportedVersion(version));
        }
        let reserved = reader.read_u32::<LittleEndian>()?;
        Ok(Self { magic, version, reserved })
    }
}

impl Default for JournalHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub seq: u64,
    pub payload_len: u32,
    pub checksum: u64,
}

impl FrameHeader {
    pub const SIZE: usize = 8 + 4 + 8; // 20 bytes

    pub fn for_payload(seq: u64, payload: &[u8]) -> Self {
        Self {
            seq,
            payload_len: payload.len() as u32,
            checksum: frame_checksum(seq, payload),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.seq.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }
}

fn frame_checksum(seq: u64, payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&seq.to_le_bytes());
    digest.write(&(payload.len() as u32).to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn decode(&self) -> Result<LedgerMutation> {
        LedgerMutation::decode(&self.payload).map_err(|e| PersistenceError::Decode {
            seq: self.header.seq,
            reason: e.to_string(),
        })
    }
}

/// Where a journal writer puts its bytes.
pub trait JournalSink: Write {
    /// Make everything written so far durable.
    fn sync(&mut self) -> io::Result<()>;

    /// Drop everything past `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }
}

/// Append-only journal writer.
///
/// # Safety Guarantees
/// - Write + fsync before returning
/// - Opening an existing file re-validates every frame first
/// - A failed append is cut back off the file; if that fails too, the
///   writer refuses every later append
pub struct JournalWriter<S: JournalSink = File> {
    path: PathBuf,
    sink: S,
    next_seq: u64,
    /// Length of the file up to the end of the last durable frame.
    durable_len: u64,
    poisoned: bool,
}

impl JournalWriter<File> {
    /// Open or create a journal file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let existing = path.exists() && std::fs::metadata(&path)?.len() > 0;
        let next_seq = if existing {
            let mut count = 0u64;
            for frame in JournalReader::open(&path)? {
                frame?;
                count += 1;
            }
            count
        } else {
            0
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if !existing {
            JournalHeader::new().write_to(&mut file)?;
            file.sync_all()?;
        }
        let durable_len = file.metadata()?.len();

        Ok(Self::with_sink(path, file, next_seq, durable_len))
    }
}

impl<S: JournalSink> JournalWriter<S> {
    /// Continue a journal held by `sink`, which already holds `len` valid
    /// bytes: the header plus frames `0..next_seq`.
    pub fn with_sink(path: PathBuf, sink: S, next_seq: u64, len: u64) -> Self {
        Self {
            path,
            sink,
            next_seq,
            durable_len: len,
            poisoned: false,
        }
    }

    /// Append one raw frame. Only returns Ok() after a durable write.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        if self.poisoned {
            return Err(PersistenceError::Poisoned {
                path: self.path.display().to_string(),
            });
        }
        let seq = self.next_seq;
        if payload.len() > MAX_PAYLOAD_LEN as usize {
            return Err(PersistenceError::FrameTooLarge {
                seq,
                len: u32::try_from(payload.len()).unwrap_or(u32::MAX),
                max: MAX_PAYLOAD_LEN,
            });
        }
        let header = FrameHeader::for_payload(seq, payload);
        let mut frame = Vec::with_capacity(FrameHeader::SIZE + payload.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(payload);

        if let Err(e) = self.write_durably(&frame) {
            self.roll_back();
            return Err(e.into());
        }

        self.durable_len += frame.len() as u64;
        self.next_seq += 1;
        Ok(seq)
    }

    fn write_durably(&mut self, frame: &[u8]) -> io::Result<()> {
        self.sink.write_all(frame)?;
        self.sink.flush()?;
        self.sink.sync()
    }

    /// Cut a torn frame off so the next frame follows the last good one.
    fn roll_back(&mut self) {
        if self.sink.truncate(self.durable_len).is_err() {
            self.poisoned = true;
        }
    }

    pub fn append_mutation(&mut self, mutation: &LedgerMutation) -> Result<u64> {
        let payload = mutation
            .encode()
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;
        self.append(&payload)
    }

    pub fn frame_count(&self) -> u64 {
        self.next_seq
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct JournalReader {
    reader: BufReader<File>,
    expected_seq: u64,
    failed: bool,
}

impl JournalReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        JournalHeader::read_from(&mut reader)?;
        Ok(Self {
            reader,
            expected_seq: 0,
            failed: false,
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut head = [0u8; FrameHeader::SIZE];
        let mut filled = 0;
        while filled < head.len() {
            match self.reader.read(&mut head[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < head.len() {
            return Err(PersistenceError::Truncated { seq: self.expected_seq });
        }

        let header = FrameHeader {
            seq: LittleEndian::read_u64(&head[0..8]),
            payload_len: LittleEndian::read_u32(&head[8..12]),
            checksum: LittleEndian::read_u64(&head[12..20]),
        };
        if header.seq != self.expected_seq {
            return Err(PersistenceError::SequenceGap {
                expected: self.expected_seq,
                found: header.seq,
            });
        }

        if header.payload_len > MAX_PAYLOAD_LEN {
            return Err(PersistenceError::FrameTooLarge {
                seq: header.seq,
                len: header.payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        if let Err(e) = self.reader.read_exact(&mut payload) {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(PersistenceError::Truncated { seq: header.seq });
            }
            return Err(e.into());
        }

        let found = frame_checksum(header.seq, &payload);
        if found != header.checksum {
            return Err(PersistenceError::ChecksumMismatch {
                seq: header.seq,
                expected: header.checksum,
                found,
            });
        }

        self.expected_seq += 1;
        Ok(Some(Frame { header, payload }))
    }
}

impl Iterator for JournalReader {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode every mutation in the journal, in order.
pub fn read_mutations(path: impl AsRef<Path>) -> Result<Vec<LedgerMutation>> {
    JournalReader::open(path)?
        .map(|frame| frame.and_then(|f| f.decode()))
        .collect()
}

/// Rebuild ledger state from a journal. The journal always wins; any bad
/// frame or rejected mutation aborts the replay.
pub fn replay(path: impl AsRef<Path>) -> Result<LedgerState> {
    let mut state = LedgerState::new();
    for frame in JournalReader::open(path)? {
        let frame = frame?;
        let mutation = frame.decode()?;
        state
            .apply(&mutation)
            .map_err(|source| PersistenceError::Replay {
                seq: frame.header.seq,
                source,
            })?;
    }
    Ok(state)
}
