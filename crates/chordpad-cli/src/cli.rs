use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "chordpad")]
#[command(about = "Draft checkpoints and versioned saves for chord charts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// JSON file with draft settings (stored overrides still apply)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage authoritative charts
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Write a local draft checkpoint
    Checkpoint {
        /// Chart ID the draft belongs to
        chart_id: String,
        /// Draft content (stdin or $EDITOR when omitted)
        content: Vec<String>,
        /// Mark as an explicit checkpoint rather than an autosave
        #[arg(long)]
        manual: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List live drafts of a chart, newest first
    #[command(alias = "ls")]
    List {
        chart_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the newest live draft of a chart
    Latest {
        chart_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Commit content to the chart with a version check
    Save {
        chart_id: String,
        /// New content (stdin or $EDITOR when omitted)
        content: Vec<String>,
        /// Version the content is based on; newer charts are reported as conflicts
        #[arg(long, value_name = "VERSION")]
        base_version: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a chart in $EDITOR and save it, restoring unsaved drafts first
    Edit { chart_id: String },
    /// Compare the latest draft with the chart and restore or discard it
    Recover {
        chart_id: String,
        /// Commit the draft content to the chart
        #[arg(long, conflicts_with = "discard")]
        apply: bool,
        /// Delete all drafts of the chart
        #[arg(long)]
        discard: bool,
        /// Preview length in lines
        #[arg(long, value_name = "N")]
        lines: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show draft storage statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove expired drafts and enforce the global draft cap
    Purge {
        /// Only remove expired drafts
        #[arg(long)]
        expired_only: bool,
        /// Total drafts to keep (defaults to the configured target)
        #[arg(long, value_name = "N")]
        target: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change stored draft settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Create a chart at version 1
    Create {
        chart_id: String,
        /// Initial content (stdin or $EDITOR when omitted)
        content: Vec<String>,
    },
    /// Print a chart
    Show {
        chart_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print effective settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store one setting override
    Set {
        /// Setting name, e.g. debounce_ms
        key: String,
        value: String,
    },
    /// Remove all stored overrides
    Reset,
}
