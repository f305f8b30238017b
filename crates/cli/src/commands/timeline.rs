// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use canon_kernel::visibility::visible_to;
use canon_kernel::{CanonEvent, LedgerState, Rank, TimelineFilter, UserId};

pub struct TimelineArgs {
    pub owner: String,
    /// Defaults to the owner.
    pub viewer: Option<String>,
    /// Treat the viewer as a trusted connection of the owner.
    pub connected: bool,
    pub min_rank: Option<String>,
    pub include_related: bool,
    pub json: bool,
}

/// Every event the viewer may see, newest first. Offline there is no social
/// graph, so connection scope follows `connected`.
pub fn collect(state: &LedgerState, args: &TimelineArgs) -> anyhow::Result<Vec<CanonEvent>> {
    let owner = UserId::from(args.owner.as_str());
    let viewer = args.viewer.as_deref().map(UserId::from).unwrap_or_else(|| owner.clone());
    let min_rank = args.min_rank.as_deref().map(str::parse::<Rank>).transpose()?;
    let filter = TimelineFilter {
        event_types: Vec::new(),
        min_rank,
        include_related: args.include_related,
    };

    let page = state.timeline(&owner, &filter, None, usize::MAX);
    Ok(page
        .items
        .into_iter()
        .filter(|e| visible_to(e, &viewer, || args.connected))
        .collect())
}

pub fn run(journal_path: &str, args: TimelineArgs) -> anyhow::Result<()> {
    let state = canon_persistence::replay(journal_path)?;
    let events = collect(&state, &args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Timestamp", "Type", "Rank", "Scope", "Canon", "Title"]);

    for event in &events {
        let canon = if state.is_verified(event.id) && event.has_stamp() { "✓" } else { "" };
        table.add_row(vec![
            event.id.0.to_string(),
            super::format_ts(event.timestamp.millis()),
            event.event_type.as_str().to_string(),
            event.rank.as_str().to_string(),
            event.scope.as_str().to_string(),
            canon.to_string(),
            event.title.clone(),
        ]);
    }

    println!("\nTimeline of {}\n", args.owner);
    println!("{table}\n");
    Ok(())
}
