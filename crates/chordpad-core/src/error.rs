//! Error types for chordpad-core

use thiserror::Error;

use crate::models::QuotaExceeded;

/// Result type alias using chordpad-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in chordpad-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or draft not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Draft storage is not ready yet (schema migration in flight)
    #[error("Draft store unavailable: {0}")]
    StoreUnavailable(String),

    /// Local storage budget exhausted, even after an emergency purge
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(QuotaExceeded),

    /// The authoritative record moved on between read and write
    #[error("Version mismatch: expected {expected}, found {actual}")]
    VersionMismatch { expected: i64, actual: i64 },

    /// Another save is already in flight for this editor
    #[error("A save is already in progress")]
    SaveInProgress,

    /// A detected conflict must be resolved before saving again
    #[error("Unresolved conflict: choose local or remote content before saving")]
    UnresolvedConflict,

    /// The autosave scheduler has shut down
    #[error("Autosave scheduler is closed")]
    SchedulerClosed,
}

impl Error {
    /// Whether this error means the drafts table does not exist yet.
    pub fn is_store_unavailable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) => true,
            Self::LibSql(error) => error
                .to_string()
                .to_ascii_lowercase()
                .contains("no such table"),
            Self::Database(message) => message.to_ascii_lowercase().contains("no such table"),
            _ => false,
        }
    }

    /// Whether the underlying database reported that it ran out of space.
    pub fn is_storage_full(&self) -> bool {
        let message = match self {
            Self::QuotaExceeded(_) => return true,
            Self::LibSql(error) => error.to_string(),
            Self::Database(message) => message.clone(),
            _ => return false,
        };
        let message = message.to_ascii_lowercase();
        message.contains("database or disk is full") || message.contains("sqlite_full")
    }

    /// Whether retrying the same operation later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::LibSql(_)
                | Self::Io(_)
                | Self::StoreUnavailable(_)
                | Self::VersionMismatch { .. }
                | Self::SaveInProgress
        )
    }
}
