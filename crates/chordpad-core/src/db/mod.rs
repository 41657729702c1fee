//! Database layer for Chordpad

mod connection;
mod draft_repository;
mod migrations;
mod record_repository;
mod settings_repository;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use connection::Database;
pub use draft_repository::{DraftRepository, LibSqlDraftRepository};
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};

/// Database handle shared by the draft store, record store and settings.
pub type SharedDatabase = Arc<Mutex<Database>>;
