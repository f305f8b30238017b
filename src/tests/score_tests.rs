// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::event::EventDraft;
use crate::score::{canon_ratio, echo_total, streak, ScoreTally};
use crate::state::LedgerState;
use crate::tests::fixtures::{append, user, verify};
use crate::types::time::{Timestamp, MILLIS_PER_DAY};

#[test]
fn test_canon_ratio_bounds() {
    assert_eq!(canon_ratio(0, 0), 0);
    assert_eq!(canon_ratio(3, 4), 75);
    assert_eq!(canon_ratio(1, 3), 33);
    assert_eq!(canon_ratio(2, 3), 67);
    assert_eq!(canon_ratio(1, 8), 13); // 12.5 rounds up
    assert_eq!(canon_ratio(5, 5), 100);
    assert_eq!(canon_ratio(9, 5), 100);
}

#[test]
fn test_tally_example_scenario() {
    let mut state = LedgerState::new();
    let now = 30 * MILLIS_PER_DAY;
    let mut events = Vec::new();
    for i in 0..4u64 {
        let ev = append(
            &mut state,
            EventDraft::new("u1", "stamp-unlock", format!("stamp {}", i))
                .with_stamp(format!("stamp-{}", i))
                .with_echo(10),
            now - (i + 1) * MILLIS_PER_DAY,
        );
        events.push(ev);
    }
    for ev in &events[..3] {
        verify(&mut state, ev);
    }

    let floor = Timestamp(now).saturating_sub_days(7);
    let mut tally = ScoreTally::default();
    for ev in state.events_by_owner(&user("u1")) {
        tally.observe(ev, state.is_verified(ev.id), floor);
    }
    assert_eq!(tally.canon_ratio(), 75);
    assert_eq!(tally.echo_score, 40);
    assert_eq!(tally.streak, 3);
}

#[test]
fn test_unstamped_verified_events_do_not_count_as_canon() {
    let mut state = LedgerState::new();
    let plain = append(&mut state, EventDraft::new("u1", "milestone", "plain"), 1);
    verify(&mut state, &plain);

    let mut tally = ScoreTally::default();
    tally.observe(state.event(plain.id).unwrap(), true, Timestamp(0));
    assert_eq!(tally.canon_ratio(), 0);
    // It still counts toward the streak.
    assert_eq!(tally.streak, 1);
}

#[test]
fn test_streak_window() {
    let mut state = LedgerState::new();
    let now = 100 * MILLIS_PER_DAY;
    let old = append(&mut state, EventDraft::new("u1", "milestone", "old"), now - 20 * MILLIS_PER_DAY);
    let recent = append(&mut state, EventDraft::new("u1", "milestone", "recent"), now - MILLIS_PER_DAY);
    let events = vec![recent.clone(), old.clone()];

    assert_eq!(streak(&events, |_| true, Timestamp(now), 7), 1);
    assert_eq!(streak(&events, |_| true, Timestamp(now), 30), 2);
    assert_eq!(streak(&events, |e| e.id == old.id, Timestamp(now), 7), 0);
    assert_eq!(echo_total(&events), 0);
}
