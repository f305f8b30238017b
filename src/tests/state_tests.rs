// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelError;
use crate::event::EventDraft;
use crate::state::{LedgerMutation, LedgerState};
use crate::storyline::{StampStoryline, StorylineDefinition};
use crate::tests::fixtures::{append, user};
use crate::types::enums::Scope;
use crate::types::id::EventId;
use crate::types::time::Timestamp;

#[test]
fn test_timestamps_monotonic_per_owner() {
    let mut state = LedgerState::new();
    let a = append(&mut state, EventDraft::new("u1", "milestone", "a"), 1_000);
    // Clock steps backwards; the store must still move forward.
    let b = append(&mut state, EventDraft::new("u1", "milestone", "b"), 500);
    let c = append(&mut state, EventDraft::new("u1", "milestone", "c"), 500);
    assert!(a.timestamp < b.timestamp);
    assert!(b.timestamp < c.timestamp);

    // Other owners are unaffected by u1's clock.
    let d = append(&mut state, EventDraft::new("u2", "milestone", "d"), 500);
    assert_eq!(d.timestamp, Timestamp(500));
}

#[test]
fn test_apply_rejects_reused_id_and_stale_timestamp() {
    let mut state = LedgerState::new();
    let a = append(&mut state, EventDraft::new("u1", "milestone", "a"), 1_000);

    let reused = LedgerMutation::EventAppended { event: a.clone(), dedup_key: None };
    assert!(matches!(state.apply(&reused), Err(KernelError::Invariant(_))));

    let mut stale = a.clone();
    stale.id = state.next_event_id();
    stale.timestamp = Timestamp(999);
    let stale = LedgerMutation::EventAppended { event: stale, dedup_key: None };
    assert!(matches!(state.apply(&stale), Err(KernelError::Invariant(_))));
    assert_eq!(state.event_count(), 1);
}

#[test]
fn test_dedup_window() {
    let mut state = LedgerState::new();
    let event = EventDraft::new("u1", "job-completed", "Boiler fixed")
        .validate()
        .unwrap()
        .into_event(state.next_event_id(), Timestamp(10_000));
    state
        .apply(&LedgerMutation::EventAppended { event: event.clone(), dedup_key: Some("k1".into()) })
        .unwrap();

    let owner = user("u1");
    assert_eq!(state.dedup_hit(&owner, "k1", Timestamp(10_000 + 5_000), 60), Some(event.id));
    assert_eq!(state.dedup_hit(&owner, "k1", Timestamp(10_000 + 61_000), 60), None);
    assert_eq!(state.dedup_hit(&user("u2"), "k1", Timestamp(10_000), 60), None);
    assert_eq!(state.dedup_hit(&owner, "k2", Timestamp(10_000), 60), None);
}

#[test]
fn test_scope_is_the_only_mutable_field() {
    let mut state = LedgerState::new();
    let a = append(&mut state, EventDraft::new("u1", "milestone", "a"), 1);
    state
        .apply(&LedgerMutation::ScopeChanged { event_id: a.id, scope: Scope::Private })
        .unwrap();
    let stored = state.event(a.id).unwrap();
    assert_eq!(stored.scope, Scope::Private);
    assert_eq!(stored.title, a.title);

    let missing = LedgerMutation::ScopeChanged { event_id: EventId(99), scope: Scope::Public };
    assert_eq!(state.apply(&missing), Err(KernelError::EventNotFound(EventId(99))));
}

#[test]
fn test_storyline_progressions_contiguous_and_unique() {
    let mut state = LedgerState::new();
    let e1 = append(&mut state, EventDraft::new("u1", "stamp-unlock", "first"), 1);
    let e2 = append(&mut state, EventDraft::new("u1", "stamp-unlock", "second"), 2);

    let def = StorylineDefinition::new("collector", "Collector", "", 3);
    let sl = StampStoryline::open(state.next_storyline_id(), user("u1"), &def).unwrap();
    state.apply(&LedgerMutation::StorylineOpened { storyline: sl.clone() }).unwrap();

    let p1 = sl.next_progression(state.next_progression_id(), &e1, Timestamp(3)).unwrap();
    state.apply(&LedgerMutation::StorylineAdvanced { progression: p1.clone() }).unwrap();

    // Same cause again is rejected, state untouched.
    let mut again = p1.clone();
    again.id = state.next_progression_id();
    again.stage_number = 2;
    assert!(state.apply(&LedgerMutation::StorylineAdvanced { progression: again }).is_err());
    assert_eq!(state.storyline(sl.id).unwrap().stage, 1);

    let current = state.storyline(sl.id).unwrap().clone();
    let p2 = current.next_progression(state.next_progression_id(), &e2, Timestamp(4)).unwrap();
    state.apply(&LedgerMutation::StorylineAdvanced { progression: p2 }).unwrap();

    let stages: Vec<u32> = state.progressions(sl.id).iter().map(|p| p.stage_number).collect();
    assert_eq!(stages, vec![1, 2]);
    assert!(state.has_progression_for(sl.id, e1.id));

    // Second open for the same (owner, type) is refused.
    let dup = StampStoryline::open(state.next_storyline_id(), user("u1"), &def).unwrap();
    assert!(state.apply(&LedgerMutation::StorylineOpened { storyline: dup }).is_err());
}

#[test]
fn test_replay_matches_live_state() {
    let mut journal = Vec::new();
    let mut live = LedgerState::new();
    for i in 0..5u64 {
        let ev = EventDraft::new("u1", "job-completed", format!("job {}", i))
            .with_echo(i)
            .validate()
            .unwrap()
            .into_event(live.next_event_id(), Timestamp(100 + i));
        let m = LedgerMutation::EventAppended { event: ev, dedup_key: None };
        live.apply(&m).unwrap();
        journal.push(m);
    }

    let replayed = LedgerState::replay(&journal).unwrap();
    assert_eq!(replayed.applied(), live.applied());
    let a: Vec<_> = live.events_by_owner(&user("u1")).cloned().collect();
    let b: Vec<_> = replayed.events_by_owner(&user("u1")).cloned().collect();
    assert_eq!(a, b);
    assert_eq!(replayed.next_event_id(), live.next_event_id());
}

#[test]
fn test_check_leaves_state_untouched() {
    let mut state = LedgerState::new();
    let a = append(&mut state, EventDraft::new("u1", "milestone", "a"), 1_000);
    let applied = state.applied();

    let bad = LedgerMutation::VerdictRecorded { event_id: EventId(99), verified: true };
    assert!(matches!(state.check(&bad), Err(KernelError::EventNotFound(EventId(99)))));

    let good = LedgerMutation::VerdictRecorded { event_id: a.id, verified: true };
    state.check(&good).unwrap();
    assert_eq!(state.applied(), applied);
    assert!(!state.is_verified(a.id));
}

#[test]
fn test_events_after_follows_commit_order() {
    let mut state = LedgerState::new();
    assert_eq!(state.last_event_id(), EventId(0));
    append(&mut state, EventDraft::new("u1", "milestone", "a"), 10);
    append(&mut state, EventDraft::new("u2", "milestone", "b"), 5);
    append(&mut state, EventDraft::new("u1", "milestone", "c"), 20);

    assert_eq!(state.last_event_id(), EventId(3));
    let tail: Vec<u64> = state.events_after(EventId(1), 10).iter().map(|e| e.id.0).collect();
    assert_eq!(tail, vec![2, 3]);
    assert_eq!(state.events_after(EventId(0), 1).len(), 1);
    assert!(state.events_after(EventId(3), 10).is_empty());
}
