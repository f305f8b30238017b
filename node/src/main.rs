// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use canon_node::config::NodeConfig;
use canon_node::enrichment::HttpCommentary;
use canon_node::server::build_router;
use canon_node::service::CanonLedgerService;
use canon_node::telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_telemetry();

    let cfg = NodeConfig::from_env();
    tracing::info!(
        "Initializing Canon Node (journal: {:?}, dedup window: {}s)",
        cfg.journal_path,
        cfg.dedup_window_secs
    );

    let mut builder = CanonLedgerService::builder(cfg.clone());
    if let Some(url) = &cfg.commentary_url {
        tracing::info!("Commentary enrichment via {}", url);
        builder = builder.commentary(Arc::new(HttpCommentary::new(url.clone(), cfg.storage_timeout)?));
    }
    let service = builder.build().await?;

    let app = build_router(service.clone(), cfg.auth_token.clone());

    let addr = cfg.bind_addr;
    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    service.shutdown().await;
    Ok(())
}
