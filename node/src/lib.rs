// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod clock;
pub mod context;
pub mod store;
pub mod event_store;
pub mod scores;
pub mod storylines;
pub mod chain;
pub mod broadcast;
pub mod signal;
pub mod enrichment;
pub mod service;
pub mod api;
pub mod server;
