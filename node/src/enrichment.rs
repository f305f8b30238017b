// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Optional flavor text for new events, produced by an external generator.
//! Never on the critical path: failures are counted and logged.

use async_trait::async_trait;
use canon_kernel::CanonEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{LedgerError, Result};

#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    async fn commentary(&self, event: &CanonEvent) -> Result<String>;
}

#[derive(Serialize)]
struct CommentaryRequest<'a> {
    event_type: &'a str,
    title: &'a str,
    description: &'a str,
    rank: &'a str,
}

#[derive(Deserialize)]
struct CommentaryResponse {
    text: String,
}

/// JSON-over-HTTP generator: POSTs the event summary, expects `{"text": ...}`.
pub struct HttpCommentary {
    client: reqwest::Client,
    url: String,
}

impl HttpCommentary {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Enrichment(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl CommentaryGenerator for HttpCommentary {
    async fn commentary(&self, event: &CanonEvent) -> Result<String> {
        let req = CommentaryRequest {
            event_type: event.event_type.as_str(),
            title: &event.title,
            description: &event.description,
            rank: event.rank.as_str(),
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| LedgerError::Enrichment(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LedgerError::Enrichment(format!(
                "generator returned {}",
                resp.status()
            )));
        }

        let body: CommentaryResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Enrichment(e.to_string()))?;
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(LedgerError::Enrichment("generator returned empty text".into()));
        }
        Ok(text)
    }
}
