//! Draft model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of the random suffix appended to draft ids.
const SUFFIX_LEN: usize = 12;

/// Identifier of a draft: `{parent_id}-{saved_at_ms}-{random suffix}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(String);

impl DraftId {
    /// Create a fresh id for a draft of `parent_id` written at `saved_at`.
    ///
    /// The suffix comes from the random tail of a UUID v7, so two drafts
    /// written in the same millisecond still get distinct ids.
    #[must_use]
    pub fn generate(parent_id: &str, saved_at: i64) -> Self {
        let uuid = Uuid::now_v7().simple().to_string();
        let suffix = &uuid[uuid.len() - SUFFIX_LEN..];
        Self(format!("{parent_id}-{saved_at}-{suffix}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DraftId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local checkpoint of the whole document for one parent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    /// Authoritative record this draft shadows
    pub parent_id: String,
    /// Full document text at checkpoint time
    pub content: String,
    /// Checkpoint timestamp (Unix ms)
    pub saved_at: i64,
    /// Absolute expiry (Unix ms)
    pub expires_at: i64,
    /// Last read timestamp (Unix ms), used for LRU ranking
    pub last_accessed_at: i64,
    /// Debounced/idle checkpoint rather than an explicit save
    pub is_auto_save: bool,
    /// Always 1; drafts are only versioned against the record
    pub version: i64,
}

impl Draft {
    /// Build a draft written at `now`, expiring after `retention_ms`.
    #[must_use]
    pub fn new(
        parent_id: impl Into<String>,
        content: impl Into<String>,
        is_auto_save: bool,
        now: i64,
        retention_ms: i64,
    ) -> Self {
        let parent_id = parent_id.into();
        Self {
            id: DraftId::generate(&parent_id, now),
            parent_id,
            content: content.into(),
            saved_at: now,
            expires_at: now.saturating_add(retention_ms),
            last_accessed_at: now,
            is_auto_save,
            version: 1,
        }
    }

    /// A draft whose expiry has been reached is no longer readable.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Diagnostic summary of the draft store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DraftStats {
    pub total_drafts: u64,
    pub expired_drafts: u64,
    pub auto_save_drafts: u64,
    pub manual_drafts: u64,
    /// Estimated bytes held by all drafts
    pub total_size: u64,
    /// `saved_at` of the oldest draft
    pub oldest_draft: Option<i64>,
    /// `saved_at` of the newest draft
    pub newest_draft: Option<i64>,
}

/// Counts removed by a maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: u64,
    pub evicted: u64,
}
