// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const EVENTS_RECORDED: &str = "canon_events_recorded_total";
pub const EVENTS_DEDUPLICATED: &str = "canon_events_deduplicated_total";
pub const CHAINS_SEALED: &str = "canon_chains_sealed_total";
pub const BROADCAST_DELIVERED: &str = "canon_broadcast_delivered_total";
pub const BROADCAST_DROPPED: &str = "canon_broadcast_dropped_total";
pub const ENRICHMENT_FAILURES: &str = "canon_enrichment_failures_total";
pub const STORYLINE_PROGRESSIONS: &str = "canon_storyline_progressions_total";
pub const RECORD_EVENT_DURATION: &str = "canon_record_event_duration_seconds";

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // 1. Logs
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "canon_node=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Metrics (Prometheus)
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::error!("Failed to install Prometheus recorder: {}", e),
    }

    metrics::describe_counter!(EVENTS_RECORDED, "Canon events committed to the ledger");
    metrics::describe_counter!(EVENTS_DEDUPLICATED, "recordEvent calls answered from the dedup index");
    metrics::describe_counter!(CHAINS_SEALED, "Chains moved to the sealed state");
    metrics::describe_counter!(BROADCAST_DELIVERED, "Events handed to subscriber buffers");
    metrics::describe_counter!(BROADCAST_DROPPED, "Events dropped because a subscriber buffer was full");
    metrics::describe_counter!(ENRICHMENT_FAILURES, "Commentary enrichment calls that failed");
    metrics::describe_counter!(STORYLINE_PROGRESSIONS, "Storyline stages advanced");
    metrics::describe_histogram!(RECORD_EVENT_DURATION, "Time taken by recordEvent");

    metrics::gauge!("canon_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
