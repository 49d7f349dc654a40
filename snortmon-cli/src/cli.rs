//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// snortmon -- Snort alert ingestion and query tool.
///
/// Use `snortmon <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "snortmon", version, about, long_about = None)]
pub struct Cli {
    /// Path to the snortmon.toml configuration file.
    #[arg(short, long, default_value = "snortmon.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest new alert lines into the event store.
    Ingest(IngestArgs),

    /// Manage the rule catalog.
    Rules(RulesArgs),

    /// Inspect or purge stored events.
    Events(EventsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- ingest ----

/// Read the alert file from the saved cursor.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Drain everything currently in the file, then exit.
    ///
    /// Without this flag the ingestion loop runs until Ctrl+C.
    #[arg(long)]
    pub once: bool,
}

// ---- rules ----

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// Run the rule updater and dump, then load new rules into the catalog.
    Update,
    /// List catalog rules ordered by (sid, gid, rev).
    List {
        /// Exact signature id.
        #[arg(long)]
        sid: Option<u32>,
        /// Exact revision.
        #[arg(long)]
        rev: Option<u32>,
        /// Exact generator id.
        #[arg(long)]
        gid: Option<u32>,
        /// Page number (1-based).
        #[arg(long, default_value_t = 1)]
        page: u64,
    },
}

// ---- events ----

#[derive(Args, Debug)]
pub struct EventsArgs {
    #[command(subcommand)]
    pub action: EventsAction,
}

#[derive(Subcommand, Debug)]
pub enum EventsAction {
    /// Count visible events grouped by signature or address pair.
    Count {
        /// Grouping: sid or addr.
        #[arg(long = "type", value_name = "TYPE")]
        group: String,
        /// Window: all, day, week or month.
        #[arg(long, default_value = "all")]
        period: String,
    },
    /// Physically delete every stored event.
    Purge {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, ingest, storage, api, rules, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
