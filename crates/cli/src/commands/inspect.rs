// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use canon_persistence::{JournalHeader, JournalReader};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Frame-level summary of a journal.
#[derive(Debug, Default)]
pub struct JournalReport {
    pub frames: u64,
    pub bytes: u64,
    pub kinds: BTreeMap<&'static str, u64>,
    /// First bad frame, if the journal does not read cleanly to the end.
    pub error: Option<String>,
}

pub fn resolve(dir: Option<PathBuf>, journal_path: Option<String>) -> PathBuf {
    match (dir, journal_path) {
        (_, Some(p)) => PathBuf::from(p),
        (Some(d), None) => d.join("ledger.journal"),
        (None, None) => PathBuf::from("ledger.journal"),
    }
}

pub fn scan(path: &Path) -> anyhow::Result<JournalReport> {
    let mut report = JournalReport {
        bytes: std::fs::metadata(path)?.len(),
        ..Default::default()
    };
    for frame in JournalReader::open(path)? {
        match frame.and_then(|f| f.decode()) {
            Ok(mutation) => {
                report.frames += 1;
                *report.kinds.entry(mutation.kind()).or_insert(0) += 1;
            }
            Err(e) => {
                report.error = Some(e.to_string());
                break;
            }
        }
    }
    Ok(report)
}

pub fn run(dir: Option<PathBuf>, journal_path: Option<String>) -> anyhow::Result<()> {
    let path = resolve(dir, journal_path);

    println!("\nCanon Journal Report");
    println!("--------------------");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Item", "Status", "Details"]);

    if !path.exists() {
        table.add_row(vec!["Journal", "MISSING", &path.display().to_string()]);
        println!("{table}\n");
        return Ok(());
    }

    match JournalHeader::read_from(BufReader::new(File::open(&path)?)) {
        Ok(header) => {
            let msg = format!(
                "Magic: {:?}, Ver: {}",
                std::str::from_utf8(&header.magic).unwrap_or("BAD"),
                header.version
            );
            table.add_row(vec!["Header", "FOUND", &msg]);
        }
        Err(e) => {
            table.add_row(vec!["Header", "CORRUPT", &e.to_string()]);
            println!("{table}\n");
            return Ok(());
        }
    }

    let report = scan(&path)?;
    let status = if report.error.is_some() { "CORRUPT" } else { "OK" };
    table.add_row(vec![
        "Frames".to_string(),
        status.to_string(),
        format!("{} frames, {} bytes", report.frames, report.bytes),
    ]);
    for (kind, count) in &report.kinds {
        table.add_row(vec![kind.to_string(), String::new(), count.to_string()]);
    }
    if let Some(err) = &report.error {
        table.add_row(vec!["First error", "", err.as_str()]);
    }

    println!("{table}\n");
    Ok(())
}
