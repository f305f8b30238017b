// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use canon_kernel::config::{DEFAULT_DEDUP_WINDOW_SECS, DEFAULT_MAX_CHAIN_LENGTH};
use canon_kernel::PrestigeLadder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    /// Durable journal. `None` keeps the ledger in memory only.
    pub journal_path: Option<PathBuf>,
    pub dedup_window_secs: u64,
    pub storage_timeout: Duration,
    pub auth_token: Option<String>,
    pub commentary_url: Option<String>,
    pub subscriber_buffer: usize,
    pub signal_queue: usize,
    pub max_chain_length: usize,
    pub streak_window_days: u64,
    pub score_page_size: usize,
    pub prestige: PrestigeLadder,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            journal_path: None,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            storage_timeout: Duration::from_millis(5_000),
            auth_token: None,
            commentary_url: None,
            subscriber_buffer: 64,
            signal_queue: 1024,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            streak_window_days: 30,
            score_page_size: 256,
            prestige: PrestigeLadder::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `CANON_*` environment variables. Unparseable
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(addr) = parse_var::<SocketAddr>("CANON_BIND_ADDR") {
            cfg.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("CANON_JOURNAL_PATH") {
            if !path.trim().is_empty() {
                cfg.journal_path = Some(PathBuf::from(path));
            }
        }
        if let Some(secs) = parse_var::<u64>("CANON_DEDUP_WINDOW_SECS") {
            cfg.dedup_window_secs = secs;
        }
        if let Some(ms) = parse_var::<u64>("CANON_STORAGE_TIMEOUT_MS") {
            cfg.storage_timeout = Duration::from_millis(ms);
        }
        cfg.auth_token = non_empty_var("CANON_AUTH_TOKEN");
        cfg.commentary_url = non_empty_var("CANON_COMMENTARY_URL");
        if let Some(n) = parse_var::<usize>("CANON_SUBSCRIBER_BUFFER") {
            cfg.subscriber_buffer = n.max(1);
        }
        if let Some(n) = parse_var::<usize>("CANON_MAX_CHAIN_LENGTH") {
            cfg.max_chain_length = n.max(1);
        }

        cfg
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}
