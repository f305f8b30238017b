// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use canon_kernel::{ChainId, EventDraft, EventId, Rank, SealResult, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventRequest {
    #[serde(flatten)]
    pub draft: EventDraft,
    #[serde(default)]
    pub dedup_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventResponse {
    pub id: EventId,
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeScopeRequest {
    pub owner_id: UserId,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRequest {
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealChainRequest {
    pub owner_id: UserId,
    pub chain_id: ChainId,
    #[serde(default)]
    pub final_event_id: Option<EventId>,
    #[serde(default)]
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealChainResponse {
    #[serde(flatten)]
    pub result: SealResult,
    /// False when another caller sealed first.
    pub sealed_by_this_call: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendToChainRequest {
    pub owner_id: UserId,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
    pub event_id: EventId,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureChainRequest {
    pub owner_id: UserId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineParams {
    pub owner: UserId,
    #[serde(default)]
    pub viewer: Option<UserId>,
    #[serde(default)]
    pub include_related: bool,
    #[serde(default)]
    pub min_rank: Option<String>,
    /// Comma-separated event types.
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreParams {
    #[serde(default)]
    pub window_days: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeParams {
    pub observer: UserId,
    #[serde(default)]
    pub target: Option<UserId>,
    #[serde(default)]
    pub min_rank: Option<Rank>,
    #[serde(default)]
    pub live: Option<bool>,
}
