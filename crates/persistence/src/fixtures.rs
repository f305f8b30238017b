// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Scenario journals for tooling tests.

use crate::error::{PersistenceError, Result};
use crate::journal::JournalWriter;

use canon_kernel::{
    CanonicalChain, EventDraft, KernelError, LedgerMutation, LedgerState, NewEvent, PrestigeLadder, Rank, Scope,
    Timestamp, UserId,
};
use std::fs;
use std::path::{Path, PathBuf};

pub const SCENARIO_OWNER: &str = "maya";
pub const SCENARIO_START_MS: u64 = 1_700_000_000_000;

pub struct ScenarioPaths {
    pub journal: PathBuf,
}

/// Writes `ledger.journal` into `dir`:
/// - four stamped events for `maya`, the first three verified
/// - one private event for `maya` naming `omar`
/// - a chain `[e1, e3, e4]` sealed with `e2` as the final event
/// - the `chain-sealed` broadcast, committed with the seal
pub fn generate_ledger_scenario(dir: &Path) -> Result<ScenarioPaths> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    let path = dir.join("ledger.journal");
    if path.exists() {
        fs::remove_file(&path)?;
    }

    let mut writer = JournalWriter::open(&path)?;
    let mut state = LedgerState::new();
    let mut commit = |state: &mut LedgerState, m: LedgerMutation| -> Result<()> {
        writer.append_mutation(&m)?;
        state
            .apply(&m)
            .map_err(|source| PersistenceError::Replay { seq: state.applied(), source })
    };

    let owner = UserId::from(SCENARIO_OWNER);
    let drafts = [
        EventDraft::new(SCENARIO_OWNER, "job-completed", "Rewired the bakery").with_rank("regional"),
        EventDraft::new(SCENARIO_OWNER, "milestone", "Hundredth job"),
        EventDraft::new(SCENARIO_OWNER, "stamp-unlock", "Night shift stamp").with_echo(4),
        EventDraft::new(SCENARIO_OWNER, "review-received", "Five stars from the mill"),
    ];

    let mut ids = Vec::new();
    for (i, draft) in drafts.into_iter().enumerate() {
        let new = draft.with_stamp(format!("stamp-{}", i + 1)).validate()?;
        let clock = Timestamp(SCENARIO_START_MS + (i as u64) * 60_000);
        let ts = state.next_timestamp(&owner, clock);
        let event = new.into_event(state.next_event_id(), ts);
        ids.push(event.id);
        commit(&mut state, LedgerMutation::EventAppended { event, dedup_key: Some(format!("k{}", i + 1)) })?;
    }
    for id in &ids[..3] {
        commit(&mut state, LedgerMutation::VerdictRecorded { event_id: *id, verified: true })?;
    }

    let private = EventDraft::new(SCENARIO_OWNER, "job-completed", "Quiet favour")
        .with_scope("private")
        .with_related(["omar"])
        .validate()?;
    let ts = state.next_timestamp(&owner, Timestamp(SCENARIO_START_MS + 300_000));
    let event = private.into_event(state.next_event_id(), ts);
    commit(&mut state, LedgerMutation::EventAppended { event, dedup_key: None })?;

    // Chain: e1, e3, e4 then sealed with e2.
    let mut chain = CanonicalChain::open(state.next_chain_id(), owner.clone());
    for (idx, note) in [(0usize, Some("where it began")), (2, None), (3, None)] {
        let event = state.event(ids[idx]).cloned().ok_or(KernelError::EventNotFound(ids[idx]))?;
        chain.push(&event, note.map(str::to_string), 256)?;
    }
    let members = state.chain_members(&chain)?;
    chain.rescore(&members);
    commit(&mut state, LedgerMutation::ChainWritten { chain: chain.clone() })?;

    let mut sealed = chain.clone();
    let last = state.event(ids[1]).cloned().ok_or(KernelError::EventNotFound(ids[1]))?;
    sealed.push(&last, Some("the capstone".to_string()), 256)?;
    let members = state.chain_members(&sealed)?;
    sealed.rescore(&members);
    let title = PrestigeLadder::default().title_for(sealed.prestige_score, sealed.sequence.len());
    let now = Timestamp(SCENARIO_START_MS + 600_000);
    sealed.seal(owner.clone(), Some("done".to_string()), title.clone(), now)?;
    sealed.revision += 1;

    let top_rank = members.iter().map(|e| e.rank).max().unwrap_or(Rank::Local);
    let broadcast = NewEvent::chain_sealed(
        owner.clone(),
        format!("{} sealed: {}", sealed.title, title),
        "done".to_string(),
        top_rank,
        Scope::Public,
        0,
    );
    let ts = state.next_timestamp(&owner, now);
    let event = broadcast.into_event(state.next_event_id(), ts);
    sealed.seal_event_id = Some(event.id);
    let dedup_key = Some(format!("chain-sealed:{}", sealed.id));
    commit(&mut state, LedgerMutation::ChainSealed { chain: sealed, event, dedup_key })?;

    Ok(ScenarioPaths { journal: path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::replay;
    use tempfile::tempdir;

    #[test]
    fn test_scenario_replays() {
        let dir = tempdir().unwrap();
        let paths = generate_ledger_scenario(dir.path()).unwrap();
        let state = replay(&paths.journal).unwrap();

        assert_eq!(state.event_count(), 6);
        let chain = state.chain_of(&UserId::from(SCENARIO_OWNER)).unwrap();
        assert!(chain.is_complete);
        assert_eq!(chain.sequence.iter().map(|id| id.0).collect::<Vec<_>>(), vec![1, 3, 4, 2]);
        assert_eq!(chain.seal_event_id.map(|id| id.0), Some(6));
        assert_eq!(chain.revision, 1);
    }
}
