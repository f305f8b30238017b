// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append signal worker.
//!
//! Appends only wake the worker; the worker then reads everything committed
//! after its cursor, in commit order, and drives the storyline tracker and
//! the broadcast router for each event. Wake-ups can be coalesced or dropped
//! without losing events, and per-owner order follows commit order.
//!
//! On start the worker first re-runs the storyline tracker (not the router)
//! over the events already in the store, so work lost to a crash between
//! commit and processing is picked up. The tracker skips causes it has
//! already counted. Events whose tracker retries run out are kept and tried
//! again on the next drain.

use canon_kernel::{CanonEvent, EventId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastRouter;
use crate::errors::{LedgerError, Result};
use crate::store::LedgerStore;
use crate::storylines::StorylineTracker;

const BATCH: usize = 256;
const TRACKER_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(20);

/// Handle held by the writers and by callers awaiting derived work.
#[derive(Clone)]
pub struct SignalHub {
    wake: mpsc::Sender<()>,
    processed: watch::Receiver<EventId>,
}

impl SignalHub {
    /// Nudge the worker. Never blocks; a full queue already has a wake-up pending.
    pub fn notify(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.wake.try_send(()) {
            tracing::warn!("Signal worker is gone; derived work will not run");
        }
    }

    /// Highest event id whose storyline and broadcast work is done.
    pub fn processed(&self) -> EventId {
        *self.processed.borrow()
    }

    /// Resolve once the worker has handled `id`.
    pub async fn wait_for(&self, id: EventId) -> Result<()> {
        let mut rx = self.processed.clone();
        rx.wait_for(|done| *done >= id)
            .await
            .map(|_| ())
            .map_err(|_| LedgerError::Storage("signal worker stopped".into()))
    }
}

pub struct SignalWorker {
    store: Arc<dyn LedgerStore>,
    tracker: Arc<StorylineTracker>,
    router: Arc<BroadcastRouter>,
    cursor: EventId,
    processed: watch::Sender<EventId>,
    stalled: Vec<CanonEvent>,
}

/// Start the worker after `start_after`. Events at or below it are not
/// broadcast again; their storyline work is replayed before anything else.
pub fn spawn_signal_worker(
    store: Arc<dyn LedgerStore>,
    tracker: Arc<StorylineTracker>,
    router: Arc<BroadcastRouter>,
    queue: usize,
    start_after: EventId,
    shutdown: CancellationToken,
) -> (SignalHub, JoinHandle<()>) {
    let (wake_tx, wake_rx) = mpsc::channel(queue.max(1));
    // Held back until catch-up is done so waiting on an old id covers its storylines.
    let (processed_tx, processed_rx) = watch::channel(EventId(0));

    let worker = SignalWorker {
        store,
        tracker,
        router,
        cursor: start_after,
        processed: processed_tx,
        stalled: Vec::new(),
    };
    let handle = tokio::spawn(worker.run(wake_rx, shutdown));

    (
        SignalHub {
            wake: wake_tx,
            processed: processed_rx,
        },
        handle,
    )
}

impl SignalWorker {
    async fn run(mut self, mut wake: mpsc::Receiver<()>, shutdown: CancellationToken) {
        tracing::info!("Signal worker started after {}", self.cursor);
        self.catch_up(&shutdown).await;
        self.processed.send_replace(self.cursor);
        // Anything committed during catch-up is waiting behind the cursor.
        self.drain().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = wake.recv() => {
                    if msg.is_none() {
                        break;
                    }
                }
            }
            // Coalesce queued wake-ups; one drain covers them all.
            while wake.try_recv().is_ok() {}
            self.drain().await;
        }
        tracing::info!("Signal worker stopped at {}", self.cursor);
    }

    /// Re-run storylines for everything up to the start cursor.
    async fn catch_up(&mut self, shutdown: &CancellationToken) {
        let mut after = EventId(0);
        let mut replayed = 0usize;
        while after < self.cursor && !shutdown.is_cancelled() {
            let batch = match self.store.events_after(after, BATCH).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!("Storyline catch-up could not read past {}: {}", after, e);
                    return;
                }
            };
            if batch.is_empty() {
                break;
            }
            for event in batch {
                if event.id > self.cursor {
                    after = self.cursor;
                    break;
                }
                if !self.track(&event).await {
                    self.stalled.push(event.clone());
                }
                after = event.id;
                replayed += 1;
            }
        }
        tracing::info!("Storyline catch-up checked {} events up to {}", replayed, self.cursor);
    }

    async fn retry_stalled(&mut self) {
        if self.stalled.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.stalled);
        for event in pending {
            if !self.track(&event).await {
                self.stalled.push(event);
            }
        }
    }

    async fn drain(&mut self) {
        self.retry_stalled().await;
        loop {
            let batch = match self.store.events_after(self.cursor, BATCH).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!("Signal worker could not read past {}: {}", self.cursor, e);
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }
            for event in batch {
                if !self.track(&event).await {
                    self.stalled.push(event.clone());
                }
                self.router.publish(&event).await;
                self.cursor = event.id;
                self.processed.send_replace(event.id);
            }
        }
    }

    /// Run the tracker with retries. `false` when the event must be tried again later.
    async fn track(&self, event: &CanonEvent) -> bool {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.tracker.on_event_appended(event).await {
                Ok(_) => return true,
                Err(e) if e.is_retryable() && attempt < TRACKER_ATTEMPTS => {
                    let backoff = RETRY_BASE * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        "Storyline update for {} failed (attempt {}): {}. Retrying in {:?}",
                        event.id,
                        attempt,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!("Storyline update for {} deferred: {}", event.id, e);
                    return false;
                }
                Err(e) => {
                    tracing::error!("Storyline update for {} abandoned: {}", event.id, e);
                    return true;
                }
            }
        }
    }
}
