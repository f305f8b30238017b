// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::chain::CanonicalChain;
use crate::event::EventDraft;
use crate::state::{LedgerMutation, LedgerState};
use crate::tests::fixtures::{append, user};
use crate::types::time::Timestamp;

#[test]
fn test_mutation_encoding_is_deterministic() {
    let mut state = LedgerState::new();
    let a = append(
        &mut state,
        EventDraft::new("u1", "stamp-unlock", "a")
            .with_related(["u3", "u2"])
            .with_stamp("gold"),
        1,
    );
    let mut chain = CanonicalChain::open(state.next_chain_id(), user("u1"));
    chain.push(&a, Some("first".into()), 4).unwrap();
    chain.seal(user("u1"), None, "Initiate".into(), Timestamp(9)).unwrap();

    let m = LedgerMutation::ChainWritten { chain };
    let bytes1 = m.encode().unwrap();
    let bytes2 = m.encode().unwrap();
    assert_eq!(bytes1, bytes2, "Mutation serialization must be deterministic");
    assert_eq!(LedgerMutation::decode(&bytes1).unwrap(), m);
}

#[test]
fn test_seal_digest_independent_of_annotation_insert_order() {
    let mut state = LedgerState::new();
    let a = append(&mut state, EventDraft::new("u1", "milestone", "a"), 1);
    let b = append(&mut state, EventDraft::new("u1", "milestone", "b"), 2);

    let mut left = CanonicalChain::open(state.next_chain_id(), user("u1"));
    left.push(&a, None, 4).unwrap();
    left.push(&b, None, 4).unwrap();
    let mut right = left.clone();

    left.annotations.insert(a.id, "x".into());
    left.annotations.insert(b.id, "y".into());
    right.annotations.insert(b.id, "y".into());
    right.annotations.insert(a.id, "x".into());
    assert_eq!(left.body_digest(), right.body_digest());
}

#[test]
fn test_json_wire_names() {
    use crate::types::enums::{EventType, Rank, Scope};

    assert_eq!(serde_json::to_string(&EventType::JobCompleted).unwrap(), "\"job-completed\"");
    assert_eq!(serde_json::to_string(&EventType::ChainSealed).unwrap(), "\"chain-sealed\"");
    assert_eq!(serde_json::to_string(&Rank::Legendary).unwrap(), "\"legendary\"");
    assert_eq!(serde_json::to_string(&Scope::Connections).unwrap(), "\"connections\"");

    let mut state = LedgerState::new();
    let event = append(&mut state, EventDraft::new("u1", "milestone", "m"), 5);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["owner_id"], "u1");
    assert_eq!(json["id"], 1);
    assert_eq!(json["scope"], "public");
}
