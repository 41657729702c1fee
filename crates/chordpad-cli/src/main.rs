//! Chordpad CLI - Draft checkpoints and versioned saves for chord charts
//!
//! Inspect and maintain the local draft store, commit chart edits with
//! version checks, and recover work left behind by an interrupted session.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::checkpoint::run_checkpoint;
use crate::commands::common::{resolve_db_path, App};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::drafts::{run_latest, run_list};
use crate::commands::edit::run_edit;
use crate::commands::maintenance::{run_purge, run_stats};
use crate::commands::record::run_record;
use crate::commands::recover::run_recover;
use crate::commands::save::run_save;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so --json output stays parseable.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chordpad=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config_path = cli.config.as_deref();

    // Completions need no database.
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let app = App::open(&db_path, config_path).await?;
    let result = dispatch(&app, cli.command, config_path).await;
    app.close().await;
    result
}

async fn dispatch(
    app: &App,
    command: Commands,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    match command {
        Commands::Record { command } => run_record(app, command).await,
        Commands::Checkpoint {
            chart_id,
            content,
            manual,
            json,
        } => run_checkpoint(app, &chart_id, &content, manual, json).await,
        Commands::List { chart_id, json } => run_list(app, &chart_id, json).await,
        Commands::Latest { chart_id, json } => run_latest(app, &chart_id, json).await,
        Commands::Save {
            chart_id,
            content,
            base_version,
            json,
        } => run_save(app, &chart_id, &content, base_version, json).await,
        Commands::Edit { chart_id } => run_edit(app, &chart_id).await,
        Commands::Recover {
            chart_id,
            apply,
            discard,
            lines,
            json,
        } => run_recover(app, &chart_id, apply, discard, lines, json).await,
        Commands::Stats { json } => run_stats(app, json).await,
        Commands::Purge {
            expired_only,
            target,
            json,
        } => run_purge(app, expired_only, target, json).await,
        Commands::Config { command } => run_config(&app.db, command, config_path).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
