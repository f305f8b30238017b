// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    body::Body,
    extract::{Path, Query, Request as AxumRequest, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use canon_kernel::{
    CanonEvent, ChainSummary, EventId, EventType, Page, Rank, Scope, StorylineId, StorylineProgression,
    TimelineCursor, TimelineFilter, UserId,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::*;
use crate::broadcast::SubscriptionFilter;
use crate::errors::{LedgerError, Result};
use crate::scores::ScoreSummary;
use crate::service::{CanonLedgerService, EventView, StorylineOverview, TimelineQuery};

pub type SharedService = Arc<CanonLedgerService>;

async fn auth_guard(
    State(token): State<Arc<Option<String>>>,
    req: AxumRequest,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    if let Some(token_str) = &*token {
        let provided = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.strip_prefix("Bearer "));

        if provided == Some(token_str.as_str()) {
            return Ok(next.run(req).await);
        }
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(service: SharedService, auth_token: Option<String>) -> Router {
    let mut app = Router::new()
        // Events
        .route("/v1/events", post(record_event))
        .route("/v1/events/:id", get(get_event))
        .route("/v1/events/:id/scope", post(change_scope))
        .route("/v1/events/:id/verdict", post(record_verdict))
        // Chains
        .route("/v1/chains/seal", post(seal_chain))
        .route("/v1/chains/append", post(append_to_chain))
        .route("/v1/chains/configure", post(configure_chain))
        .route("/v1/chains/:owner", get(get_chain))
        // Reads
        .route("/v1/timeline", get(get_timeline))
        .route("/v1/scores/:owner", get(get_scores))
        .route("/v1/storylines/owner/:owner", get(get_storylines))
        .route("/v1/storylines/:id/progressions", get(get_progressions))
        // Live feed
        .route("/v1/subscribe", get(subscribe))
        .with_state(service);

    if let Some(token) = auth_token {
        tracing::info!("Auth Enabled: Bearer token required");
        let auth_state = Arc::new(Some(token));
        app = app.layer(from_fn_with_state(auth_state, auth_guard));
    } else {
        tracing::warn!("Auth Disabled: No token configured");
    }

    // Observability stays outside the auth layer.
    app.route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn record_event(
    State(service): State<SharedService>,
    Json(req): Json<RecordEventRequest>,
) -> Result<Json<RecordEventResponse>> {
    let ctx = service.context();
    let outcome = service.record_event(&ctx, req.draft, req.dedup_key).await?;
    Ok(Json(RecordEventResponse {
        id: outcome.id,
        deduplicated: outcome.deduplicated,
    }))
}

async fn get_event(State(service): State<SharedService>, Path(id): Path<u64>) -> Result<Json<EventView>> {
    let ctx = service.context();
    Ok(Json(service.get_event(&ctx, EventId(id)).await?))
}

async fn change_scope(
    State(service): State<SharedService>,
    Path(id): Path<u64>,
    Json(req): Json<ChangeScopeRequest>,
) -> Result<Json<CanonEvent>> {
    let scope: Scope = req.scope.parse()?;
    let ctx = service.context();
    Ok(Json(service.change_scope(&ctx, &req.owner_id, EventId(id), scope).await?))
}

async fn record_verdict(
    State(service): State<SharedService>,
    Path(id): Path<u64>,
    Json(req): Json<VerdictRequest>,
) -> Result<Json<VerdictResponse>> {
    let ctx = service.context();
    service.record_verdict(&ctx, EventId(id), req.verified).await?;
    Ok(Json(VerdictResponse { success: true }))
}

async fn seal_chain(
    State(service): State<SharedService>,
    Json(req): Json<SealChainRequest>,
) -> Result<Json<SealChainResponse>> {
    let ctx = service.context();
    let outcome = service
        .seal_chain(&ctx, &req.owner_id, req.chain_id, req.final_event_id, req.annotation)
        .await?;
    let sealed_by_this_call = outcome.won();
    Ok(Json(SealChainResponse {
        result: outcome.into_result(),
        sealed_by_this_call,
    }))
}

async fn append_to_chain(
    State(service): State<SharedService>,
    Json(req): Json<AppendToChainRequest>,
) -> Result<Json<ChainSummary>> {
    let ctx = service.context();
    let summary = service
        .append_to_chain(&ctx, &req.owner_id, req.chain_id, req.event_id, req.note)
        .await?;
    Ok(Json(summary))
}

async fn configure_chain(
    State(service): State<SharedService>,
    Json(req): Json<ConfigureChainRequest>,
) -> Result<Json<ChainSummary>> {
    let ctx = service.context();
    Ok(Json(service.configure_chain(&ctx, &req.owner_id, req.title, req.is_public).await?))
}

async fn get_chain(State(service): State<SharedService>, Path(owner): Path<String>) -> Result<Json<ChainSummary>> {
    let ctx = service.context();
    Ok(Json(service.get_chain(&ctx, &UserId(owner)).await?))
}

async fn get_timeline(
    State(service): State<SharedService>,
    Query(params): Query<TimelineParams>,
) -> Result<Json<Page<CanonEvent>>> {
    let min_rank = params.min_rank.as_deref().map(str::parse::<Rank>).transpose()?;
    let event_types = match params.types.as_deref() {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse::<EventType>)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let cursor = params.cursor.as_deref().map(str::parse::<TimelineCursor>).transpose()?;

    let query = TimelineQuery {
        owner: params.owner,
        viewer: params.viewer,
        filter: TimelineFilter {
            event_types,
            min_rank,
            include_related: params.include_related,
        },
        cursor,
        limit: params.limit,
    };
    let ctx = service.context();
    Ok(Json(service.get_timeline(&ctx, query).await?))
}

async fn get_scores(
    State(service): State<SharedService>,
    Path(owner): Path<String>,
    Query(params): Query<ScoreParams>,
) -> Result<Json<ScoreSummary>> {
    let ctx = service.context();
    Ok(Json(service.scores(&ctx, &UserId(owner), params.window_days).await?))
}

async fn get_storylines(
    State(service): State<SharedService>,
    Path(owner): Path<String>,
) -> Result<Json<StorylineOverview>> {
    let ctx = service.context();
    Ok(Json(service.storylines(&ctx, &UserId(owner)).await?))
}

async fn get_progressions(
    State(service): State<SharedService>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<StorylineProgression>>> {
    let ctx = service.context();
    Ok(Json(service.progressions(&ctx, StorylineId(id)).await?))
}

/// NDJSON stream of events this observer may see. The subscription is
/// pruned once the client goes away.
async fn subscribe(
    State(service): State<SharedService>,
    Query(params): Query<SubscribeParams>,
) -> Result<Response> {
    if params.observer.is_blank() {
        return Err(LedgerError::Validation("observer is required".into()));
    }
    let filter = SubscriptionFilter {
        target_owner_id: params.target,
        min_rank: params.min_rank.unwrap_or_default(),
        live_participation: params.live.unwrap_or(true),
    };
    let subscription = service.subscribe(params.observer, filter);
    tracing::info!("Live feed opened ({:?})", subscription.handle);

    let stream = tokio_stream::wrappers::ReceiverStream::new(subscription.receiver).map(|event| {
        let mut line = serde_json::to_string(&event).unwrap_or_default();
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .map_err(|e| LedgerError::Storage(e.to_string()))
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}
