//! CLI argument definitions using clap derive API

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Ascension Tracker - crawl, store and tag Kingdom of Loathing ascension histories
#[derive(Parser, Debug)]
#[command(name = "ascension-tracker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Override config file path
    #[arg(short, long, global = true, env = "ASCENSION_TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured database URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Keep everything in memory instead of the configured database
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest players above the highest stored id until the first blank
    Discover,

    /// Ingest a range of ids, stopping after a run of blank ids
    Scan(ScanArgs),

    /// Ingest the given player ids
    Ids(IdsArgs),

    /// Ingest everyone on the recent-ascenders listing
    Recent,

    /// Re-fetch players and overwrite their stored runs
    Reparse(IdsArgs),

    /// Recompute record-breaking and personal-best tags
    Tag,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// First id to fetch
    #[arg(long, default_value_t = 1)]
    pub from: i64,

    /// Last id to fetch (unbounded when omitted)
    #[arg(long)]
    pub to: Option<i64>,
}

#[derive(Args, Debug)]
pub struct IdsArgs {
    /// Player ids
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<i64>,
}
