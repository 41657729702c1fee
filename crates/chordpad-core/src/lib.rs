//! chordpad-core - Draft persistence for the Chordpad editor
//!
//! This crate keeps in-progress chord chart edits safe between explicit
//! saves: a quota-guarded local draft store, a debounced autosave
//! scheduler, a bridge that commits content to the authoritative record
//! store with optimistic versioning, and crash recovery on reopen.

use std::future::Future;
use std::pin::Pin;

pub mod autosave;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod db;
pub mod drafts;
pub mod error;
pub mod models;
pub mod quota;
pub mod recovery;
pub mod session;
pub mod state;
pub mod util;

pub use autosave::{AutosaveHandle, AutosaveSnapshot, SaveHandler, SaveTrigger, UnloadDecision};
pub use bridge::{
    merge_changes, AuthoritativeStore, LibSqlRecordStore, MergeResolution, MergeStrategy,
    PersistenceBridge,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DraftConfig;
pub use drafts::DraftStore;
pub use error::{Error, Result};
pub use models::{
    AuthoritativeRecord, ConflictData, Draft, DraftId, DraftStats, SaveFailure, SaveFailureKind,
    SaveResult,
};
pub use quota::{QuotaGuard, StorageEstimator};
pub use recovery::{DraftPreview, RecoveryCheck, RecoveryComparator, TextPreview};
pub use session::{ConflictOutcome, DraftContext, EditorSession};
pub use state::SaveStatus;

/// Boxed future used by object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
