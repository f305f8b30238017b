#[cfg(test)]
// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod fixtures;
pub mod state_tests;
pub mod score_tests;
pub mod determinism_tests;
