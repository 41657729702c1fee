//! Data models for Chordpad

mod draft;
mod quota;
mod record;
mod save_result;

pub use draft::{Draft, DraftId, DraftStats, SweepReport};
pub use quota::{QuotaCheck, QuotaExceeded, StorageEstimate};
pub use record::{AuthoritativeRecord, VersionedSave};
pub use save_result::{ConflictData, SaveFailure, SaveFailureKind, SaveResult};
