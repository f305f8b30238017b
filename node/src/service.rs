// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! CanonLedgerService: the façade every surface (HTTP, tests, embedding)
//! talks to. Wires the store, the components and the append signal worker.

use canon_kernel::{
    CanonEvent, ChainId, ChainSummary, EventDraft, EventId, Page, Scope, StampStoryline, StorylineId,
    StorylineProgression, TimelineCursor, TimelineFilter, UserId,
};
use canon_kernel::visibility::visible_to;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{BroadcastRouter, ConnectionGraph, StaticConnections, Subscription, SubscriptionFilter, SubscriptionHandle};
use crate::chain::{ChainSealer, SealOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::NodeConfig;
use crate::context::OpContext;
use crate::enrichment::CommentaryGenerator;
use crate::errors::Result;
use crate::event_store::{AppendOutcome, EventStore};
use crate::scores::{ScoreAggregator, ScoreSummary};
use crate::signal::{spawn_signal_worker, SignalHub};
use crate::store::{LedgerStore, MemoryStore};
use crate::storylines::{RuleSet, StorylineRules, StorylineTracker};
use crate::telemetry::{ENRICHMENT_FAILURES, RECORD_EVENT_DURATION};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct TimelineQuery {
    pub owner: UserId,
    /// Who is looking. `None` means the owner.
    pub viewer: Option<UserId>,
    pub filter: TimelineFilter,
    pub cursor: Option<TimelineCursor>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventView {
    pub event: CanonEvent,
    pub commentary: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorylineOverview {
    pub active: Vec<StampStoryline>,
    pub completed: Vec<StampStoryline>,
}

pub struct ServiceBuilder {
    config: NodeConfig,
    store: Option<Arc<dyn LedgerStore>>,
    clock: Arc<dyn Clock>,
    connections: Arc<dyn ConnectionGraph>,
    rules: Arc<dyn StorylineRules>,
    commentary: Option<Arc<dyn CommentaryGenerator>>,
}

impl ServiceBuilder {
    pub fn store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn connections(mut self, connections: Arc<dyn ConnectionGraph>) -> Self {
        self.connections = connections;
        self
    }

    pub fn rules(mut self, rules: Arc<dyn StorylineRules>) -> Self {
        self.rules = rules;
        self
    }

    pub fn commentary(mut self, generator: Arc<dyn CommentaryGenerator>) -> Self {
        self.commentary = Some(generator);
        self
    }

    /// Assemble the service and start its signal worker. Must run inside a
    /// tokio runtime.
    pub async fn build(self) -> Result<Arc<CanonLedgerService>> {
        let config = self.config;
        let store = match self.store {
            Some(s) => s,
            None => match &config.journal_path {
                Some(path) => Arc::new(MemoryStore::open(path)?) as Arc<dyn LedgerStore>,
                None => Arc::new(MemoryStore::new()),
            },
        };

        let router = Arc::new(BroadcastRouter::new(self.connections.clone(), config.subscriber_buffer));
        let tracker = Arc::new(StorylineTracker::new(store.clone(), self.rules, self.clock.clone()));

        // Events already in the journal were fanned out before the restart;
        // only their storyline work is re-checked.
        let start_after = store.last_event_id().await?;
        let shutdown = CancellationToken::new();
        let (signals, worker) = spawn_signal_worker(
            store.clone(),
            tracker.clone(),
            router.clone(),
            config.signal_queue,
            start_after,
            shutdown.clone(),
        );

        let events = Arc::new(EventStore::new(
            store.clone(),
            self.clock.clone(),
            signals.clone(),
            config.dedup_window_secs,
        ));
        let scores = ScoreAggregator::new(store.clone(), self.clock.clone(), config.score_page_size);
        let sealer = ChainSealer::new(
            store.clone(),
            events.clone(),
            self.clock.clone(),
            config.prestige.clone(),
            config.max_chain_length,
        );

        Ok(Arc::new(CanonLedgerService {
            config,
            store,
            events,
            scores,
            tracker,
            sealer,
            router,
            signals,
            connections: self.connections,
            commentary: self.commentary,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }))
    }
}

pub struct CanonLedgerService {
    config: NodeConfig,
    store: Arc<dyn LedgerStore>,
    events: Arc<EventStore>,
    scores: ScoreAggregator,
    tracker: Arc<StorylineTracker>,
    sealer: ChainSealer,
    router: Arc<BroadcastRouter>,
    signals: SignalHub,
    connections: Arc<dyn ConnectionGraph>,
    commentary: Option<Arc<dyn CommentaryGenerator>>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CanonLedgerService {
    pub fn builder(config: NodeConfig) -> ServiceBuilder {
        ServiceBuilder {
            config,
            store: None,
            clock: Arc::new(SystemClock),
            connections: Arc::new(StaticConnections::new()),
            rules: Arc::new(RuleSet::standard()),
            commentary: None,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// A fresh context carrying the configured storage timeout.
    pub fn context(&self) -> OpContext {
        OpContext::new(self.config.storage_timeout)
    }

    // --- Events ---

    pub async fn record_event(
        &self,
        ctx: &OpContext,
        draft: EventDraft,
        dedup_key: Option<String>,
    ) -> Result<AppendOutcome> {
        let start = Instant::now();
        let result = self.events.append(ctx, draft, dedup_key).await;
        metrics::histogram!(RECORD_EVENT_DURATION, start.elapsed().as_secs_f64());

        let outcome = result?;
        if !outcome.deduplicated {
            self.enrich(ctx, outcome.id);
        }
        Ok(outcome)
    }

    pub async fn get_event(&self, ctx: &OpContext, id: EventId) -> Result<EventView> {
        let event = self.events.require(ctx, id).await?;
        let commentary = self.events.commentary(ctx, id).await?;
        let verified = self.events.is_verified(ctx, id).await?;
        Ok(EventView {
            event,
            commentary,
            verified,
        })
    }

    pub async fn change_scope(&self, ctx: &OpContext, owner: &UserId, id: EventId, scope: Scope) -> Result<CanonEvent> {
        self.events.change_scope(ctx, owner, id, scope).await
    }

    pub async fn record_verdict(&self, ctx: &OpContext, id: EventId, verified: bool) -> Result<()> {
        self.events.record_verdict(ctx, id, verified).await
    }

    /// One page of `owner`'s timeline as `viewer` may see it. Hidden events
    /// are skipped without shrinking the page, and `next_cursor` is only set
    /// when at least one more visible event exists.
    pub async fn get_timeline(&self, ctx: &OpContext, query: TimelineQuery) -> Result<Page<CanonEvent>> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let viewer = query.viewer.clone().unwrap_or_else(|| query.owner.clone());
        let mut connected: HashMap<UserId, bool> = HashMap::new();
        let mut items: Vec<CanonEvent> = Vec::with_capacity(limit);
        let mut cursor = query.cursor;

        loop {
            let page = self
                .events
                .list_by_owner(ctx, &query.owner, &query.filter, cursor, limit)
                .await?;

            for event in page.items {
                if !self.viewer_sees(&event, &viewer, &mut connected).await {
                    continue;
                }
                if items.len() == limit {
                    let next_cursor = items.last().map(|e| TimelineCursor::new(e.timestamp, e.id));
                    return Ok(Page { items, next_cursor });
                }
                items.push(event);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(Page { items, next_cursor: None }),
            }
        }
    }

    async fn viewer_sees(&self, event: &CanonEvent, viewer: &UserId, connected: &mut HashMap<UserId, bool>) -> bool {
        let is_connection = if event.scope == Scope::Connections && &event.owner_id != viewer {
            match connected.get(&event.owner_id) {
                Some(known) => *known,
                None => {
                    let known = self.connections.is_connection(viewer, &event.owner_id).await;
                    connected.insert(event.owner_id.clone(), known);
                    known
                }
            }
        } else {
            false
        };
        visible_to(event, viewer, || is_connection)
    }

    pub async fn scores(&self, ctx: &OpContext, owner: &UserId, window_days: Option<u64>) -> Result<ScoreSummary> {
        let window = window_days.unwrap_or(self.config.streak_window_days);
        self.scores.summary(ctx, owner, window).await
    }

    // --- Storylines ---

    pub async fn storylines(&self, ctx: &OpContext, owner: &UserId) -> Result<StorylineOverview> {
        let active = ctx.run(self.tracker.active_storylines(owner)).await?;
        let completed = ctx.run(self.tracker.completed_storylines(owner)).await?;
        Ok(StorylineOverview { active, completed })
    }

    pub async fn progressions(&self, ctx: &OpContext, id: StorylineId) -> Result<Vec<StorylineProgression>> {
        ctx.run(self.tracker.progressions(id)).await
    }

    // --- Chains ---

    pub async fn append_to_chain(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        chain_id: Option<ChainId>,
        event_id: EventId,
        note: Option<String>,
    ) -> Result<ChainSummary> {
        self.sealer.append(ctx, owner, chain_id, event_id, note).await
    }

    pub async fn configure_chain(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        title: Option<String>,
        is_public: Option<bool>,
    ) -> Result<ChainSummary> {
        self.sealer.configure(ctx, owner, title, is_public).await
    }

    pub async fn seal_chain(
        &self,
        ctx: &OpContext,
        owner: &UserId,
        chain_id: ChainId,
        final_event_id: Option<EventId>,
        annotation: Option<String>,
    ) -> Result<SealOutcome> {
        self.sealer.seal(ctx, owner, chain_id, final_event_id, annotation).await
    }

    pub async fn get_chain(&self, ctx: &OpContext, owner: &UserId) -> Result<ChainSummary> {
        self.sealer.get(ctx, owner).await
    }

    // --- Broadcast ---

    pub fn subscribe(&self, observer: UserId, filter: SubscriptionFilter) -> Subscription {
        self.router.subscribe(observer, filter)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.router.unsubscribe(handle)
    }

    pub fn set_live_participation(&self, handle: SubscriptionHandle, live: bool) -> bool {
        self.router.set_live_participation(handle, live)
    }

    pub fn subscriber_count(&self) -> usize {
        self.router.subscriber_count()
    }

    /// Resolve once storyline and broadcast work for `id` has run.
    pub async fn wait_for_signal(&self, id: EventId) -> Result<()> {
        self.signals.wait_for(id).await
    }

    /// Stop the signal worker. Pending derived work is abandoned.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Signal worker ended abnormally: {}", e);
            }
        }
    }

    fn enrich(&self, ctx: &OpContext, id: EventId) {
        let generator = match &self.commentary {
            Some(g) => g.clone(),
            None => return,
        };
        if ctx.is_cancelled() {
            tracing::debug!("Skipping commentary for {}: caller cancelled", id);
            return;
        }

        let store = self.store.clone();
        let cancel = ctx.cancel_token();
        tokio::spawn(async move {
            let event = match store.event(id).await {
                Ok(Some(e)) => e,
                _ => return,
            };
            let text = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Commentary for {} abandoned: caller cancelled", id);
                    return;
                }
                res = generator.commentary(&event) => res,
            };
            let attached = match text {
                Ok(t) => store.attach_commentary(id, t).await,
                Err(e) => Err(e),
            };
            if let Err(e) = attached {
                metrics::counter!(ENRICHMENT_FAILURES, 1);
                tracing::warn!("Commentary for {} failed: {}", id, e);
            }
        });
    }
}

impl Drop for CanonLedgerService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
