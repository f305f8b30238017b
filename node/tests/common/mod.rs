// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use canon_kernel::{EventDraft, EventId};
use canon_node::broadcast::StaticConnections;
use canon_node::clock::ManualClock;
use canon_node::config::NodeConfig;
use canon_node::context::OpContext;
use canon_node::service::CanonLedgerService;
use canon_node::store::MemoryStore;
use std::sync::Arc;

pub const T0: u64 = 1_700_000_000_000;
pub const DAY_MS: u64 = 86_400_000;

pub struct Harness {
    pub service: Arc<CanonLedgerService>,
    pub clock: Arc<ManualClock>,
    pub graph: Arc<StaticConnections>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(NodeConfig::default()).await
    }

    pub async fn with_config(config: NodeConfig) -> Self {
        let clock = Arc::new(ManualClock::at(T0));
        let graph = Arc::new(StaticConnections::new());
        let store = Arc::new(MemoryStore::new());
        let service = CanonLedgerService::builder(config)
            .store(store.clone())
            .clock(clock.clone())
            .connections(graph.clone())
            .build()
            .await
            .unwrap();
        Self {
            service,
            clock,
            graph,
            store,
        }
    }

    pub fn ctx(&self) -> OpContext {
        self.service.context()
    }

    /// Record and wait until storylines and broadcast have caught up.
    pub async fn record(&self, draft: EventDraft) -> EventId {
        let outcome = self.service.record_event(&self.ctx(), draft, None).await.unwrap();
        self.service.wait_for_signal(outcome.id).await.unwrap();
        self.clock.advance(1_000);
        outcome.id
    }
}
