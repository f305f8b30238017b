// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crc64fast::Digest;
use std::fs::File;
use std::io::Read;

use canon_kernel::LedgerState;

/// Full check: every frame's checksum and sequence, a clean replay, and
/// every sealed chain's digest against its stored body.
pub fn run(journal_path: &str) -> anyhow::Result<()> {
    let state = match canon_persistence::replay(journal_path) {
        Ok(state) => state,
        Err(e) => {
            println!("\n❌ CORRUPTED\n");
            println!("Reason: {}\n", e);
            return Err(e.into());
        }
    };

    let broken = broken_seals(&state);
    if !broken.is_empty() {
        println!("\n❌ TAMPERED\n");
        for id in &broken {
            println!("Chain {} no longer matches its seal digest", id);
        }
        anyhow::bail!("{} sealed chain(s) fail digest check", broken.len());
    }

    let fingerprint = file_crc64(journal_path)?;
    println!("\n✅ VERIFIED\n");
    println!("Mutations:   {}", state.applied());
    println!("Events:      {}", state.event_count());
    println!("Chains:      {} ({} sealed)", state.chains().count(), state.chains().filter(|c| c.is_complete).count());
    println!("Storylines:  {}", state.storyline_count());
    println!("Fingerprint: {:016x} (CRC64)\n", fingerprint);
    Ok(())
}

pub fn broken_seals(state: &LedgerState) -> Vec<canon_kernel::ChainId> {
    state
        .chains()
        .filter(|c| c.is_complete)
        .filter(|c| c.seal_digest != Some(c.body_digest()))
        .map(|c| c.id)
        .collect()
}

pub fn file_crc64(path: &str) -> anyhow::Result<u64> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(compute_crc64(&data))
}

pub fn compute_crc64(data: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(data);
    digest.sum64()
}
