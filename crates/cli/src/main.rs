// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use canon_cli::commands::{chain, inspect, scores, timeline, verify};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "canon")]
#[command(about = "Canon Ledger CLI - offline inspection of ledger journals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the journal header and a per-kind count of its frames.
    /// If --dir is provided, it looks for ledger.journal inside it.
    Inspect {
        /// Optional directory containing ledger.journal.
        #[arg(long, short)]
        dir: Option<PathBuf>,

        /// Path to the journal file (overrides --dir)
        #[arg(long)]
        journal_path: Option<String>,
    },
    /// Verify checksums, replay, and sealed-chain digests
    Verify {
        journal_path: String,
    },
    /// List an owner's timeline as a viewer would see it
    Timeline {
        journal_path: String,

        #[arg(long)]
        owner: String,

        /// Viewer identity (defaults to the owner)
        #[arg(long)]
        viewer: Option<String>,

        /// Treat the viewer as a trusted connection of the owner
        #[arg(long)]
        connected: bool,

        #[arg(long)]
        min_rank: Option<String>,

        /// Also list events that name the owner
        #[arg(long)]
        include_related: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Recompute an owner's scores from the journal
    Scores {
        journal_path: String,

        #[arg(long)]
        owner: String,

        #[arg(long, default_value_t = 30)]
        window_days: u64,

        /// Evaluate as of this instant (ms since epoch)
        #[arg(long)]
        now: Option<u64>,
    },
    /// Show an owner's canonical chain
    Chain {
        journal_path: String,

        #[arg(long)]
        owner: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { dir, journal_path } => inspect::run(dir, journal_path),
        Commands::Verify { journal_path } => verify::run(&journal_path),
        Commands::Timeline {
            journal_path,
            owner,
            viewer,
            connected,
            min_rank,
            include_related,
            json,
        } => timeline::run(
            &journal_path,
            timeline::TimelineArgs {
                owner,
                viewer,
                connected,
                min_rank,
                include_related,
                json,
            },
        ),
        Commands::Scores {
            journal_path,
            owner,
            window_days,
            now,
        } => scores::run(&journal_path, &owner, window_days, now),
        Commands::Chain { journal_path, owner } => chain::run(&journal_path, &owner),
    }
}
