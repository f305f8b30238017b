// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use canon_kernel::UserId;

pub fn run(journal_path: &str, owner: &str) -> anyhow::Result<()> {
    let state = canon_persistence::replay(journal_path)?;
    let chain = state
        .chain_of(&UserId::from(owner))
        .ok_or_else(|| anyhow::anyhow!("{} has no chain", owner))?;

    println!("\n{} (chain {}, revision {})", chain.title, chain.id.0, chain.revision);
    if chain.is_complete {
        println!(
            "Sealed {} by {} as \"{}\"",
            chain.completed_at.map(|t| super::format_ts(t.millis())).unwrap_or_default(),
            chain.sealed_by_user_id.as_ref().map(|u| u.as_str()).unwrap_or("?"),
            chain.prestige_title.as_deref().unwrap_or_default()
        );
    } else {
        println!("Open, prestige {}", chain.prestige_score);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Event", "Rank", "Title", "Note"]);

    for (pos, member) in state.chain_members(chain)?.iter().enumerate() {
        table.add_row(vec![
            (pos + 1).to_string(),
            member.id.0.to_string(),
            member.rank.as_str().to_string(),
            member.title.clone(),
            chain.annotations.get(&member.id).cloned().unwrap_or_default(),
        ]);
    }

    println!("{table}\n");
    Ok(())
}
