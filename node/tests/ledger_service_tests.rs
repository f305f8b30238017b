// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use canon_kernel::{EventDraft, EventType, PrestigeLadder, Rank, Scope, TimelineFilter, UserId};
use canon_node::context::OpContext;
use canon_node::errors::LedgerError;
use canon_node::service::TimelineQuery;
use common::{Harness, DAY_MS};
use std::time::Duration;

#[tokio::test]
async fn test_idempotent_append_with_dedup_key() {
    let h = Harness::new().await;
    let ctx = h.ctx();
    let draft = EventDraft::new("maya", "job-completed", "Fixed the boiler");

    let first = h
        .service
        .record_event(&ctx, draft.clone(), Some("req-1".into()))
        .await
        .unwrap();
    h.clock.advance(5_000);
    let retry = h
        .service
        .record_event(&ctx, draft, Some("req-1".into()))
        .await
        .unwrap();

    assert!(!first.deduplicated);
    assert!(retry.deduplicated);
    assert_eq!(first.id, retry.id);
    assert_eq!(h.store.with_state(|s| s.event_count()).await, 1);
}

#[tokio::test]
async fn test_rejected_input_leaves_no_trace() {
    let h = Harness::new().await;
    let ctx = h.ctx();

    let cases = [
        EventDraft::new("maya", "job-completed", "x").with_rank("mythic"),
        EventDraft::new("maya", "job-completed", "x").with_scope("friends"),
        EventDraft::new("maya", "birthday", "x"),
        EventDraft::new("maya", "chain-sealed", "x"),
        EventDraft::new("", "milestone", "x"),
        EventDraft::new("maya", "milestone", "   "),
    ];
    for draft in cases {
        let err = h.service.record_event(&ctx, draft, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)), "{:?}", err);
    }

    let blank_key = h
        .service
        .record_event(&ctx, EventDraft::new("maya", "milestone", "ok"), Some("  ".into()))
        .await
        .unwrap_err();
    assert!(matches!(blank_key, LedgerError::Validation(_)));

    assert_eq!(h.store.with_state(|s| s.event_count()).await, 0);
}

#[tokio::test]
async fn test_cancelled_before_commit_writes_nothing() {
    let h = Harness::new().await;
    let ctx = OpContext::new(Duration::from_secs(1));
    ctx.cancel_token().cancel();

    let err = h
        .service
        .record_event(&ctx, EventDraft::new("maya", "milestone", "m"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Cancelled));
    assert_eq!(h.store.with_state(|s| s.event_count()).await, 0);
}

#[tokio::test]
async fn test_storyline_stages_contiguous_and_capped() {
    let h = Harness::new().await;
    for i in 0..5 {
        h.record(EventDraft::new("maya", "stamp-unlock", format!("Stamp {}", i))).await;
    }

    let ctx = h.ctx();
    let overview = h.service.storylines(&ctx, &UserId::from("maya")).await.unwrap();
    assert!(overview.active.is_empty());
    assert_eq!(overview.completed.len(), 1);
    let collector = &overview.completed[0];
    assert_eq!(collector.title, "Stamp Collector");
    assert_eq!(collector.stage, collector.total_stages);
    assert_eq!(collector.stage, 3);

    let progressions = h.service.progressions(&ctx, collector.id).await.unwrap();
    let stages: Vec<u32> = progressions.iter().map(|p| p.stage_number).collect();
    assert_eq!(stages, vec![1, 2, 3]);
    assert_eq!(progressions[0].narrative_text, "Chapter 1 of 3: Stamp 0");
}

#[tokio::test]
async fn test_unmatched_events_open_no_storyline() {
    let h = Harness::new().await;
    h.record(EventDraft::new("maya", "review-received", "Five stars")).await;
    h.record(EventDraft::new("maya", "job-completed", "First job")).await;

    let overview = h.service.storylines(&h.ctx(), &UserId::from("maya")).await.unwrap();
    assert_eq!(overview.active.len(), 1);
    assert_eq!(overview.active[0].title, "Trusted Hands");
    assert_eq!(overview.active[0].stage, 1);
}

#[tokio::test]
async fn test_scores_from_the_log() {
    let h = Harness::new().await;
    let ctx = h.ctx();
    let maya = UserId::from("maya");

    let empty = h.service.scores(&ctx, &maya, Some(7)).await.unwrap();
    assert_eq!(empty.canon_ratio, 0);
    assert_eq!(empty.streak, 0);

    let mut ids = Vec::new();
    for i in 0..4 {
        let draft = EventDraft::new("maya", "milestone", format!("m{}", i))
            .with_stamp(format!("stamp-{}", i))
            .with_echo(i as u64);
        ids.push(h.record(draft).await);
    }
    for id in &ids[..3] {
        h.service.record_verdict(&ctx, *id, true).await.unwrap();
    }

    let summary = h.service.scores(&ctx, &maya, Some(7)).await.unwrap();
    assert_eq!(summary.canon_ratio, 75);
    assert_eq!(summary.streak, 3);
    assert_eq!(summary.echo_score, 6);
    assert_eq!(summary.total_events, 4);

    // A week later the streak window is empty but the ratio stands.
    h.clock.advance(8 * DAY_MS);
    let later = h.service.scores(&ctx, &maya, Some(7)).await.unwrap();
    assert_eq!(later.streak, 0);
    assert_eq!(later.canon_ratio, 75);
}

#[tokio::test]
async fn test_scores_page_through_long_logs() {
    let mut config = canon_node::config::NodeConfig::default();
    config.score_page_size = 3;
    let h = Harness::with_config(config).await;
    let ctx = h.ctx();

    for i in 0..10 {
        let id = h
            .record(EventDraft::new("maya", "review-received", format!("r{}", i)).with_stamp("s"))
            .await;
        if i % 2 == 0 {
            h.service.record_verdict(&ctx, id, true).await.unwrap();
        }
    }
    let summary = h.service.scores(&ctx, &UserId::from("maya"), None).await.unwrap();
    assert_eq!(summary.total_events, 10);
    assert_eq!(summary.canon_ratio, 50);
}

#[tokio::test]
async fn test_timeline_respects_viewer_scope() {
    let h = Harness::new().await;
    h.graph.connect(&UserId::from("maya"), &UserId::from("ben"));

    h.record(EventDraft::new("maya", "milestone", "public one")).await;
    h.record(EventDraft::new("maya", "milestone", "friends only").with_scope("connections")).await;
    h.record(EventDraft::new("maya", "milestone", "diary").with_scope("private")).await;

    let titles = |viewer: Option<&str>| {
        let service = h.service.clone();
        let ctx = h.ctx();
        let viewer = viewer.map(UserId::from);
        async move {
            let page = service
                .get_timeline(
                    &ctx,
                    TimelineQuery {
                        owner: UserId::from("maya"),
                        viewer,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            page.items.into_iter().map(|e| e.title).collect::<Vec<_>>()
        }
    };

    assert_eq!(titles(None).await, vec!["diary", "friends only", "public one"]);
    assert_eq!(titles(Some("ben")).await, vec!["friends only", "public one"]);
    assert_eq!(titles(Some("cy")).await, vec!["public one"]);
}

#[tokio::test]
async fn test_timeline_pagination_is_stable() {
    let h = Harness::new().await;
    for i in 0..7 {
        let scope = if i % 3 == 0 { "private" } else { "public" };
        h.record(EventDraft::new("maya", "milestone", format!("e{}", i)).with_scope(scope)).await;
    }

    // A stranger sees e1 e2 e4 e5, newest first, two per page.
    let ctx = h.ctx();
    let mut seen = Vec::new();
    let mut cursor = None;
    let mut pages = 0;
    loop {
        pages += 1;
        let page = h
            .service
            .get_timeline(
                &ctx,
                TimelineQuery {
                    owner: UserId::from("maya"),
                    viewer: Some(UserId::from("cy")),
                    cursor,
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(page.items.len() <= 2);
        seen.extend(page.items.into_iter().map(|e| e.title));
        match page.next_cursor {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }
    assert_eq!(seen, vec!["e5", "e4", "e2", "e1"]);
    // Only the private e0 lies past e1, so the second page is the last.
    assert_eq!(pages, 2);
}

#[tokio::test]
async fn test_timeline_filters_and_subject_view() {
    let h = Harness::new().await;
    h.record(EventDraft::new("maya", "milestone", "small").with_rank("local")).await;
    h.record(EventDraft::new("maya", "job-completed", "big").with_rank("global")).await;
    h.record(EventDraft::new("ben", "review-received", "thanks maya").with_related(["maya"])).await;

    let ctx = h.ctx();
    let ranked = h
        .service
        .get_timeline(
            &ctx,
            TimelineQuery {
                owner: UserId::from("maya"),
                filter: TimelineFilter {
                    min_rank: Some(Rank::Regional),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ranked.items.len(), 1);
    assert_eq!(ranked.items[0].title, "big");

    let subject = h
        .service
        .get_timeline(
            &ctx,
            TimelineQuery {
                owner: UserId::from("maya"),
                filter: TimelineFilter {
                    include_related: true,
                    event_types: vec![EventType::ReviewReceived],
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(subject.items.len(), 1);
    assert_eq!(subject.items[0].owner_id, UserId::from("ben"));
}

#[tokio::test]
async fn test_change_scope_owner_only() {
    let h = Harness::new().await;
    let ctx = h.ctx();
    let id = h.record(EventDraft::new("maya", "milestone", "m")).await;

    let err = h
        .service
        .change_scope(&ctx, &UserId::from("ben"), id, Scope::Private)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotOwner(_)));

    let updated = h
        .service
        .change_scope(&ctx, &UserId::from("maya"), id, Scope::Private)
        .await
        .unwrap();
    assert_eq!(updated.scope, Scope::Private);
    assert_eq!(updated.title, "m");
}

#[tokio::test]
async fn test_get_event_reports_verdict() {
    let h = Harness::new().await;
    let ctx = h.ctx();
    let id = h.record(EventDraft::new("maya", "provider-verified", "ID checked")).await;

    assert!(!h.service.get_event(&ctx, id).await.unwrap().verified);
    h.service.record_verdict(&ctx, id, true).await.unwrap();
    let view = h.service.get_event(&ctx, id).await.unwrap();
    assert!(view.verified);
    assert!(view.commentary.is_none());

    let missing = h.service.get_event(&ctx, canon_kernel::EventId(999)).await.unwrap_err();
    assert!(matches!(missing, LedgerError::NotFound(_)));
}

/// 4 stamped events, 3 verified; chain [e1, e3, e4] sealed with e2.
#[tokio::test]
async fn test_end_to_end_scenario() {
    let h = Harness::new().await;
    let ctx = h.ctx();
    let maya = UserId::from("maya");

    let mut ids = Vec::new();
    for (i, t) in ["job-completed", "milestone", "stamp-unlock", "review-received"].iter().enumerate() {
        let draft = EventDraft::new("maya", *t, format!("e{}", i + 1)).with_stamp(format!("s{}", i + 1));
        ids.push(h.record(draft).await);
    }
    for id in &ids[..3] {
        h.service.record_verdict(&ctx, *id, true).await.unwrap();
    }
    assert_eq!(h.service.scores(&ctx, &maya, None).await.unwrap().canon_ratio, 75);

    let mut summary = None;
    for idx in [0, 2, 3] {
        summary = Some(
            h.service
                .append_to_chain(&ctx, &maya, None, ids[idx], None)
                .await
                .unwrap(),
        );
    }
    let chain = summary.unwrap();
    assert_eq!(chain.sequence, vec![ids[0], ids[2], ids[3]]);

    let outcome = h
        .service
        .seal_chain(&ctx, &maya, chain.id, Some(ids[1]), Some("the capstone".into()))
        .await
        .unwrap();
    assert!(outcome.won());
    let result = outcome.result();
    assert!(result.is_complete);
    assert!(result.broadcast_created);

    let sealed = h.service.get_chain(&ctx, &maya).await.unwrap();
    assert_eq!(sealed.sequence, vec![ids[0], ids[2], ids[3], ids[1]]);
    assert!(sealed.is_complete);
    assert_eq!(sealed.annotations.get(&ids[1]).map(String::as_str), Some("the capstone"));
    assert_eq!(
        result.prestige_title,
        PrestigeLadder::default().title_for(sealed.prestige_score, 4)
    );

    let timeline = h
        .service
        .get_timeline(
            &ctx,
            TimelineQuery {
                owner: maya.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let broadcast = &timeline.items[0];
    assert_eq!(broadcast.event_type, EventType::ChainSealed);
    assert!(broadcast.rank >= Rank::Regional);
    assert_eq!(broadcast.scope, Scope::Public);
}
