// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use canon_kernel::{ChainId, EventDraft, EventId, EventType, Scope, UserId};
use canon_node::config::NodeConfig;
use canon_node::errors::LedgerError;
use canon_node::service::TimelineQuery;
use common::Harness;

async fn open_chain(h: &Harness, owner: &str, n: usize) -> (ChainId, Vec<EventId>) {
    let owner_id = UserId::from(owner);
    let mut ids = Vec::new();
    let mut chain = None;
    for i in 0..n {
        let id = h
            .record(EventDraft::new(owner, "job-completed", format!("job {}", i)).with_rank("regional"))
            .await;
        chain = Some(
            h.service
                .append_to_chain(&h.ctx(), &owner_id, None, id, None)
                .await
                .unwrap(),
        );
        ids.push(id);
    }
    (chain.map(|c| c.id).unwrap_or(ChainId(0)), ids)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_seals_have_one_winner() {
    let h = Harness::new().await;
    let (chain_id, _) = open_chain(&h, "maya", 3).await;
    let final_id = h.record(EventDraft::new("maya", "milestone", "the end")).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let service = h.service.clone();
        tasks.push(tokio::spawn(async move {
            let ctx = service.context();
            service
                .seal_chain(&ctx, &UserId::from("maya"), chain_id, Some(final_id), Some(format!("caller {}", i)))
                .await
        }));
    }

    let mut outcomes = Vec::new();
    for t in tasks {
        outcomes.push(t.await.unwrap().unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| o.won()).count(), 1);
    // Winner and losers report the same result, broadcast flag included.
    let winner = outcomes.iter().find(|o| o.won()).unwrap().result().clone();
    assert!(winner.is_complete);
    assert!(winner.broadcast_created);
    assert_eq!(winner.chain_id, chain_id);
    for o in &outcomes {
        assert_eq!(o.result(), &winner);
    }

    let sealed = h.service.get_chain(&h.ctx(), &UserId::from("maya")).await.unwrap();
    assert_eq!(sealed.sequence.len(), 4);
    assert_eq!(sealed.sequence.last(), Some(&final_id));

    let broadcasts = h
        .store
        .with_state(|s| s.events().filter(|e| e.event_type == EventType::ChainSealed).count())
        .await;
    assert_eq!(broadcasts, 1);
}

#[tokio::test]
async fn test_sealed_chain_is_frozen() {
    let h = Harness::new().await;
    let maya = UserId::from("maya");
    let (chain_id, ids) = open_chain(&h, "maya", 2).await;

    h.service.seal_chain(&h.ctx(), &maya, chain_id, None, None).await.unwrap();
    let before = h.service.get_chain(&h.ctx(), &maya).await.unwrap();

    let extra = h.record(EventDraft::new("maya", "milestone", "late")).await;
    let err = h
        .service
        .append_to_chain(&h.ctx(), &maya, Some(chain_id), extra, None)
        .await
        .unwrap_err();
    match err {
        LedgerError::AlreadySealed(summary) => assert_eq!(summary.sequence, ids),
        other => panic!("expected AlreadySealed, got {:?}", other),
    }

    let err = h
        .service
        .configure_chain(&h.ctx(), &maya, Some("Renamed".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadySealed(_)));

    let first = h.service.seal_chain(&h.ctx(), &maya, chain_id, None, None).await.unwrap();
    let again = h.service.seal_chain(&h.ctx(), &maya, chain_id, Some(extra), None).await.unwrap();
    assert!(!again.won());
    assert_eq!(again.result(), first.result());
    assert!(again.result().broadcast_created);

    let after = h.service.get_chain(&h.ctx(), &maya).await.unwrap();
    assert_eq!(after.sequence, before.sequence);
    assert_eq!(after.title, before.title);
    assert_eq!(after.seal_digest, before.seal_digest);
}

#[tokio::test]
async fn test_seal_with_final_event_already_in_chain() {
    let h = Harness::new().await;
    let maya = UserId::from("maya");
    let (chain_id, ids) = open_chain(&h, "maya", 2).await;

    let outcome = h
        .service
        .seal_chain(&h.ctx(), &maya, chain_id, Some(ids[1]), Some("the capstone".into()))
        .await
        .unwrap();
    assert!(outcome.won());
    assert!(outcome.result().is_complete);

    let sealed = h.service.get_chain(&h.ctx(), &maya).await.unwrap();
    assert!(sealed.is_complete);
    assert_eq!(sealed.sequence, ids);
    assert_eq!(sealed.annotations.get(&ids[1]).map(String::as_str), Some("the capstone"));
    assert_eq!(sealed.completion_note.as_deref(), Some("the capstone"));
}

#[tokio::test]
async fn test_append_rules() {
    let h = Harness::new().await;
    let maya = UserId::from("maya");
    let ctx = h.ctx();

    let own = h.record(EventDraft::new("maya", "milestone", "mine")).await;
    let theirs = h.record(EventDraft::new("ben", "milestone", "his")).await;
    let tagged = h
        .record(EventDraft::new("ben", "review-received", "for maya").with_related(["maya"]))
        .await;

    h.service.append_to_chain(&ctx, &maya, None, own, None).await.unwrap();

    let dup = h.service.append_to_chain(&ctx, &maya, None, own, None).await.unwrap_err();
    assert!(matches!(dup, LedgerError::DuplicateEvent(id) if id == own));

    let foreign = h.service.append_to_chain(&ctx, &maya, None, theirs, None).await.unwrap_err();
    assert!(matches!(foreign, LedgerError::NotOwner(_)));

    let missing = h
        .service
        .append_to_chain(&ctx, &maya, None, EventId(404), None)
        .await
        .unwrap_err();
    assert!(matches!(missing, LedgerError::NotFound(_)));

    let long_note = "x".repeat(1001);
    let bad_note = h
        .service
        .append_to_chain(&ctx, &maya, None, tagged, Some(long_note))
        .await
        .unwrap_err();
    assert!(matches!(bad_note, LedgerError::Validation(_)));

    let chain = h
        .service
        .append_to_chain(&ctx, &maya, None, tagged, Some("a kind word".into()))
        .await
        .unwrap();
    assert_eq!(chain.sequence, vec![own, tagged]);
    assert_eq!(chain.annotations.len(), 1);
    assert_eq!(chain.revision, 2);
}

#[tokio::test]
async fn test_chain_length_cap() {
    let mut config = NodeConfig::default();
    config.max_chain_length = 2;
    let h = Harness::with_config(config).await;
    let maya = UserId::from("maya");

    open_chain(&h, "maya", 2).await;
    let third = h.record(EventDraft::new("maya", "milestone", "one too many")).await;
    let err = h
        .service
        .append_to_chain(&h.ctx(), &maya, None, third, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn test_only_owner_may_seal() {
    let h = Harness::new().await;
    let (chain_id, _) = open_chain(&h, "maya", 1).await;

    let err = h
        .service
        .seal_chain(&h.ctx(), &UserId::from("ben"), chain_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotOwner(_)));

    let missing = h
        .service
        .seal_chain(&h.ctx(), &UserId::from("maya"), ChainId(77), None, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_private_chain_broadcasts_to_connections() {
    let h = Harness::new().await;
    let maya = UserId::from("maya");
    let (chain_id, _) = open_chain(&h, "maya", 2).await;

    let configured = h
        .service
        .configure_chain(&h.ctx(), &maya, Some("Quiet Work".into()), Some(false))
        .await
        .unwrap();
    assert_eq!(configured.title, "Quiet Work");
    assert!(!configured.is_public);

    let outcome = h
        .service
        .seal_chain(&h.ctx(), &maya, chain_id, None, Some("finished".into()))
        .await
        .unwrap();
    assert!(outcome.result().broadcast_created);

    let sealed = h.service.get_chain(&h.ctx(), &maya).await.unwrap();
    assert_eq!(sealed.completion_note.as_deref(), Some("finished"));
    assert_eq!(sealed.sealed_by_user_id, Some(maya.clone()));

    let page = h
        .service
        .get_timeline(
            &h.ctx(),
            TimelineQuery {
                owner: maya,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let broadcast = &page.items[0];
    assert_eq!(broadcast.event_type, EventType::ChainSealed);
    assert_eq!(broadcast.scope, Scope::Connections);
    assert_eq!(broadcast.echo_score, 0);
    assert!(broadcast.title.contains("Quiet Work"));
}

#[tokio::test]
async fn test_missing_chain_reads_not_found() {
    let h = Harness::new().await;
    let err = h.service.get_chain(&h.ctx(), &UserId::from("nobody")).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}
