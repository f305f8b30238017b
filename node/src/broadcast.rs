// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! BroadcastRouter: scope-filtered, fire-and-forget fan-out of new events.
//!
//! Delivery rules per event scope:
//! - `private`: the owner's own subscriptions only
//! - `connections`: the owner, or subscriptions targeting the owner whose
//!   observer is a trusted connection
//! - `public`: any subscription with `min_rank <= event.rank`
//!
//! In every case a subscription with a target only sees that target's
//! events, and a dormant subscription (`live_participation = false`) sees
//! nothing. A full buffer drops the event; a closed receiver is pruned.

use async_trait::async_trait;
use canon_kernel::{CanonEvent, Rank, Scope, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::telemetry::{BROADCAST_DELIVERED, BROADCAST_DROPPED};

/// Trusted-connection lookup, owned by the social graph outside the ledger.
#[async_trait]
pub trait ConnectionGraph: Send + Sync {
    async fn is_connection(&self, a: &UserId, b: &UserId) -> bool;
}

/// Symmetric in-process connection set.
#[derive(Debug, Default)]
pub struct StaticConnections {
    pairs: RwLock<HashSet<(UserId, UserId)>>,
}

impl StaticConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, a: &UserId, b: &UserId) {
        if let Ok(mut pairs) = self.pairs.write() {
            pairs.insert(ordered(a, b));
        }
    }

    pub fn disconnect(&self, a: &UserId, b: &UserId) {
        if let Ok(mut pairs) = self.pairs.write() {
            pairs.remove(&ordered(a, b));
        }
    }
}

fn ordered(a: &UserId, b: &UserId) -> (UserId, UserId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[async_trait]
impl ConnectionGraph for StaticConnections {
    async fn is_connection(&self, a: &UserId, b: &UserId) -> bool {
        self.pairs
            .read()
            .map(|pairs| pairs.contains(&ordered(a, b)))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub target_owner_id: Option<UserId>,
    #[serde(default)]
    pub min_rank: Rank,
    #[serde(default = "default_live")]
    pub live_participation: bool,
}

fn default_live() -> bool {
    true
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self {
            target_owner_id: None,
            min_rank: Rank::Local,
            live_participation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::Receiver<CanonEvent>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

struct Subscriber {
    observer: UserId,
    filter: SubscriptionFilter,
    sender: mpsc::Sender<CanonEvent>,
}

pub struct BroadcastRouter {
    subscribers: Mutex<BTreeMap<SubscriptionHandle, Subscriber>>,
    next_handle: AtomicU64,
    buffer: usize,
    connections: Arc<dyn ConnectionGraph>,
}

impl BroadcastRouter {
    pub fn new(connections: Arc<dyn ConnectionGraph>, buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
            buffer: buffer.max(1),
            connections,
        }
    }

    pub fn subscribe(&self, observer: UserId, filter: SubscriptionFilter) -> Subscription {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(self.buffer);
        tracing::debug!("Subscription {:?} opened by {} ({:?})", handle, observer, filter);
        self.lock().insert(handle, Subscriber { observer, filter, sender });
        Subscription { handle, receiver }
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.lock().remove(&handle).is_some()
    }

    /// Toggle delivery without dropping the subscription. False if unknown.
    pub fn set_live_participation(&self, handle: SubscriptionHandle, live: bool) -> bool {
        match self.lock().get_mut(&handle) {
            Some(sub) => {
                sub.filter.live_participation = live;
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub async fn publish(&self, event: &CanonEvent) -> DeliveryReport {
        // Snapshot so the connection lookups run without the lock held.
        let candidates: Vec<(SubscriptionHandle, UserId, SubscriptionFilter, mpsc::Sender<CanonEvent>)> = self
            .lock()
            .iter()
            .map(|(h, s)| (*h, s.observer.clone(), s.filter.clone(), s.sender.clone()))
            .collect();

        let mut report = DeliveryReport::default();
        let mut closed = Vec::new();

        for (handle, observer, filter, sender) in candidates {
            if !self.eligible(event, &observer, &filter).await {
                continue;
            }
            match sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Subscriber {:?} buffer full, dropping {}", handle, event.id);
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => closed.push(handle),
            }
        }

        if !closed.is_empty() {
            let mut subs = self.lock();
            for handle in &closed {
                subs.remove(handle);
            }
            report.pruned = closed.len();
            tracing::debug!("Pruned {} closed subscriptions", closed.len());
        }

        metrics::counter!(BROADCAST_DELIVERED, report.delivered as u64);
        metrics::counter!(BROADCAST_DROPPED, report.dropped as u64);
        report
    }

    async fn eligible(&self, event: &CanonEvent, observer: &UserId, filter: &SubscriptionFilter) -> bool {
        if !filter.live_participation {
            return false;
        }
        if let Some(target) = &filter.target_owner_id {
            if target != &event.owner_id {
                return false;
            }
        }
        let is_owner = observer == &event.owner_id;
        match event.scope {
            Scope::Private => is_owner,
            Scope::Connections => {
                is_owner
                    || (filter.target_owner_id.is_some()
                        && self.connections.is_connection(observer, &event.owner_id).await)
            }
            Scope::Public => event.rank >= filter.min_rank,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SubscriptionHandle, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_kernel::{EventDraft, EventId, Timestamp};

    fn event(owner: &str, scope: &str, rank: &str) -> CanonEvent {
        EventDraft::new(owner, "milestone", "m")
            .with_scope(scope)
            .with_rank(rank)
            .validate()
            .unwrap()
            .into_event(EventId(1), Timestamp(1))
    }

    fn router() -> (BroadcastRouter, Arc<StaticConnections>) {
        let graph = Arc::new(StaticConnections::new());
        (BroadcastRouter::new(graph.clone(), 4), graph)
    }

    #[tokio::test]
    async fn test_private_reaches_owner_only() {
        let (router, graph) = router();
        graph.connect(&UserId::from("ana"), &UserId::from("ben"));
        let mut own = router.subscribe(UserId::from("ana"), SubscriptionFilter::default());
        let mut friend = router.subscribe(
            UserId::from("ben"),
            SubscriptionFilter {
                target_owner_id: Some(UserId::from("ana")),
                ..Default::default()
            },
        );

        let report = router.publish(&event("ana", "private", "legendary")).await;
        assert_eq!(report.delivered, 1);
        assert!(own.receiver.try_recv().is_ok());
        assert!(friend.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connections_need_target_and_edge() {
        let (router, graph) = router();
        let mut stranger = router.subscribe(
            UserId::from("cy"),
            SubscriptionFilter {
                target_owner_id: Some(UserId::from("ana")),
                ..Default::default()
            },
        );
        let mut untargeted = router.subscribe(UserId::from("ben"), SubscriptionFilter::default());
        let mut friend = router.subscribe(
            UserId::from("ben"),
            SubscriptionFilter {
                target_owner_id: Some(UserId::from("ana")),
                ..Default::default()
            },
        );
        graph.connect(&UserId::from("ben"), &UserId::from("ana"));

        router.publish(&event("ana", "connections", "local")).await;
        assert!(stranger.receiver.try_recv().is_err());
        assert!(untargeted.receiver.try_recv().is_err());
        assert!(friend.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_public_min_rank_and_dormant() {
        let (router, _) = router();
        let picky = router.subscribe(
            UserId::from("ben"),
            SubscriptionFilter {
                min_rank: Rank::Global,
                ..Default::default()
            },
        );
        let mut picky_rx = picky.receiver;
        let mut dormant = router.subscribe(UserId::from("cy"), SubscriptionFilter::default());
        assert!(router.set_live_participation(dormant.handle, false));

        router.publish(&event("ana", "public", "regional")).await;
        assert!(picky_rx.try_recv().is_err());
        assert!(dormant.receiver.try_recv().is_err());

        router.publish(&event("ana", "public", "legendary")).await;
        assert!(picky_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_full_buffer_drops_and_closed_is_pruned() {
        let (router, _) = router();
        let _slow = router.subscribe(UserId::from("ben"), SubscriptionFilter::default());
        let gone = router.subscribe(UserId::from("cy"), SubscriptionFilter::default());
        drop(gone.receiver);

        let ev = event("ana", "public", "local");
        for _ in 0..4 {
            router.publish(&ev).await;
        }
        let report = router.publish(&ev).await;
        assert_eq!(report.dropped, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(router.subscriber_count(), 1);
    }
}
