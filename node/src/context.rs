// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Per-operation deadline and cancellation.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::{LedgerError, Result};

/// Deadline and cancellation for one public operation.
#[derive(Debug, Clone)]
pub struct OpContext {
    timeout: Duration,
    cancel: CancellationToken,
}

impl OpContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` under this context. Cancellation wins over completion
    /// when both are ready, and an elapsed deadline is a `StorageTimeout`.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LedgerError::Cancelled),
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(LedgerError::StorageTimeout),
            },
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
