use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] chordpad_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No chart content provided")]
    EmptyContent,
    #[error("Chart ID cannot be empty")]
    EmptyChartId,
    #[error("Chart not found: {0}")]
    ChartNotFound(String),
    #[error("No draft stored for {0}")]
    NoDraft(String),
    #[error("Draft for {0} is not newer than the chart; nothing to recover")]
    NothingToRecover(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Save conflict: based on v{local_version} but the chart is at v{remote_version}. Re-run with --base-version {remote_version} to overwrite, or `chordpad recover` to compare."
    )]
    Conflict {
        local_version: i64,
        remote_version: i64,
    },
    #[error("Save failed: {0}")]
    SaveFailed(String),
}
