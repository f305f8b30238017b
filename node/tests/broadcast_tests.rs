// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use canon_kernel::{CanonEvent, EventDraft, EventType, Rank, UserId};
use canon_node::broadcast::{Subscription, SubscriptionFilter};
use common::Harness;

fn drain(sub: &mut Subscription) -> Vec<CanonEvent> {
    let mut out = Vec::new();
    while let Ok(event) = sub.receiver.try_recv() {
        out.push(event);
    }
    out
}

fn titles(events: &[CanonEvent]) -> Vec<&str> {
    events.iter().map(|e| e.title.as_str()).collect()
}

#[tokio::test]
async fn test_private_events_reach_only_the_owner() {
    let h = Harness::new().await;
    h.graph.connect(&UserId::from("maya"), &UserId::from("ben"));

    let mut owner = h.service.subscribe(UserId::from("maya"), SubscriptionFilter::default());
    let mut friend = h.service.subscribe(
        UserId::from("ben"),
        SubscriptionFilter {
            target_owner_id: Some(UserId::from("maya")),
            ..Default::default()
        },
    );
    let mut stranger = h.service.subscribe(UserId::from("cy"), SubscriptionFilter::default());

    h.record(EventDraft::new("maya", "milestone", "secret").with_scope("private")).await;
    h.record(EventDraft::new("maya", "milestone", "for friends").with_scope("connections")).await;
    h.record(EventDraft::new("maya", "milestone", "for all")).await;

    assert_eq!(titles(&drain(&mut owner)), vec!["secret", "for friends", "for all"]);
    assert_eq!(titles(&drain(&mut friend)), vec!["for friends", "for all"]);
    assert_eq!(titles(&drain(&mut stranger)), vec!["for all"]);
}

#[tokio::test]
async fn test_rank_floor_and_dormant_subscriptions() {
    let h = Harness::new().await;
    let mut picky = h.service.subscribe(
        UserId::from("cy"),
        SubscriptionFilter {
            min_rank: Rank::Global,
            ..Default::default()
        },
    );
    let mut sleeper = h.service.subscribe(UserId::from("dee"), SubscriptionFilter::default());

    h.record(EventDraft::new("maya", "milestone", "small").with_rank("regional")).await;
    assert!(h.service.set_live_participation(sleeper.handle, false));
    h.record(EventDraft::new("maya", "milestone", "huge").with_rank("legendary")).await;

    assert_eq!(titles(&drain(&mut picky)), vec!["huge"]);
    assert_eq!(titles(&drain(&mut sleeper)), vec!["small"]);

    assert!(h.service.unsubscribe(picky.handle));
    assert!(!h.service.unsubscribe(picky.handle));
}

#[tokio::test]
async fn test_seal_broadcast_is_delivered() {
    let h = Harness::new().await;
    let maya = UserId::from("maya");
    let mut watcher = h.service.subscribe(
        UserId::from("cy"),
        SubscriptionFilter {
            target_owner_id: Some(maya.clone()),
            min_rank: Rank::Regional,
            ..Default::default()
        },
    );

    let id = h.record(EventDraft::new("maya", "job-completed", "job")).await;
    let chain = h.service.append_to_chain(&h.ctx(), &maya, None, id, None).await.unwrap();
    h.service.seal_chain(&h.ctx(), &maya, chain.id, None, None).await.unwrap();

    let sealed = h.service.get_chain(&h.ctx(), &maya).await.unwrap();
    let broadcast_id = h
        .store
        .with_state(|s| s.chain(sealed.id).and_then(|c| c.seal_event_id))
        .await
        .unwrap();
    h.service.wait_for_signal(broadcast_id).await.unwrap();

    // The local-rank job never passed the floor; the broadcast did.
    let seen = drain(&mut watcher);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, EventType::ChainSealed);
    assert!(seen[0].rank >= Rank::Regional);
}

#[tokio::test]
async fn test_dropped_receiver_is_pruned() {
    let h = Harness::new().await;
    let gone = h.service.subscribe(UserId::from("cy"), SubscriptionFilter::default());
    let handle = gone.handle;
    drop(gone);

    h.record(EventDraft::new("maya", "milestone", "anyone there")).await;
    assert!(!h.service.set_live_participation(handle, true));
}
