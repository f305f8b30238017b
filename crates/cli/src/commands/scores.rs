// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use canon_kernel::score::ScoreTally;
use canon_kernel::{LedgerState, Timestamp, UserId};

pub fn tally(state: &LedgerState, owner: &str, window_days: u64, now: Timestamp) -> ScoreTally {
    let owner = UserId::from(owner);
    let floor = now.saturating_sub_days(window_days);
    let mut tally = ScoreTally::default();
    for event in state.events_by_owner(&owner) {
        tally.observe(event, state.is_verified(event.id), floor);
    }
    tally
}

/// `now_ms` defaults to the wall clock.
pub fn run(journal_path: &str, owner: &str, window_days: u64, now_ms: Option<u64>) -> anyhow::Result<()> {
    let state = canon_persistence::replay(journal_path)?;
    let now = Timestamp(now_ms.unwrap_or_else(|| chrono::Utc::now().timestamp_millis().max(0) as u64));
    let t = tally(&state, owner, window_days, now);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Canon ratio".to_string(), format!("{}%", t.canon_ratio())]);
    table.add_row(vec![
        "Canon events".to_string(),
        format!("{} of {}", t.canon_events, t.total_events),
    ]);
    table.add_row(vec![format!("Streak ({}d)", window_days), t.streak.to_string()]);
    table.add_row(vec!["Echo score".to_string(), t.echo_score.to_string()]);

    println!("\nScores for {} as of {}\n", owner, super::format_ts(now.millis()));
    println!("{table}\n");
    Ok(())
}
