//! Save attempt outcomes

use serde::{Deserialize, Serialize};

use super::{AuthoritativeRecord, Draft};

/// Both sides of a version conflict, handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictData {
    /// Content the caller tried to save
    pub local: String,
    /// Content currently held by the authoritative record
    pub remote: String,
    /// Version the caller based its edit on
    pub local_version: i64,
    /// Live version of the record
    pub remote_version: i64,
}

/// Category of a failed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFailureKind {
    NotFound,
    Validation,
    Store,
    QuotaExceeded,
    SaveInProgress,
    UnresolvedConflict,
}

/// Why a save did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFailure {
    pub kind: SaveFailureKind,
    pub message: String,
    pub retryable: bool,
}

impl SaveFailure {
    pub fn new(kind: SaveFailureKind, message: impl Into<String>) -> Self {
        let retryable = matches!(
            kind,
            SaveFailureKind::Store | SaveFailureKind::SaveInProgress
        );
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Classify a core error into a failure the caller can act on.
    pub fn from_error(error: &crate::Error) -> Self {
        use crate::Error;

        let kind = match error {
            Error::NotFound(_) => SaveFailureKind::NotFound,
            Error::InvalidInput(_) => SaveFailureKind::Validation,
            Error::QuotaExceeded(_) => SaveFailureKind::QuotaExceeded,
            Error::SaveInProgress => SaveFailureKind::SaveInProgress,
            Error::UnresolvedConflict => SaveFailureKind::UnresolvedConflict,
            _ => SaveFailureKind::Store,
        };
        let message = match error {
            Error::QuotaExceeded(quota) => quota.user_message(),
            other => other.to_string(),
        };
        Self {
            kind,
            message,
            retryable: error.is_retryable(),
        }
    }
}

/// The single return contract of every save attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub success: bool,
    /// Content matched the last saved content; nothing was written
    #[serde(default)]
    pub unchanged: bool,
    #[serde(default)]
    pub conflict_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_data: Option<ConflictData>,
    /// Updated authoritative record after a successful commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<AuthoritativeRecord>,
    /// Local checkpoint written by this attempt, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<Draft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SaveFailure>,
    /// When the attempt finished (Unix ms)
    pub timestamp: i64,
}

impl SaveResult {
    fn base(success: bool, timestamp: i64) -> Self {
        Self {
            success,
            unchanged: false,
            conflict_detected: false,
            conflict_data: None,
            record: None,
            draft: None,
            error: None,
            timestamp,
        }
    }

    /// Content was committed to the authoritative store.
    pub fn committed(record: AuthoritativeRecord, timestamp: i64) -> Self {
        Self {
            record: Some(record),
            ..Self::base(true, timestamp)
        }
    }

    /// Content was checkpointed locally.
    pub fn checkpointed(draft: Draft, timestamp: i64) -> Self {
        Self {
            draft: Some(draft),
            ..Self::base(true, timestamp)
        }
    }

    pub fn unchanged(timestamp: i64) -> Self {
        Self {
            unchanged: true,
            ..Self::base(true, timestamp)
        }
    }

    pub fn conflict(conflict: ConflictData, timestamp: i64) -> Self {
        Self {
            conflict_detected: true,
            conflict_data: Some(conflict),
            ..Self::base(false, timestamp)
        }
    }

    pub fn failed(failure: SaveFailure, timestamp: i64) -> Self {
        Self {
            error: Some(failure),
            ..Self::base(false, timestamp)
        }
    }

    /// Message of the failure, if the attempt failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|failure| failure.message.as_str())
    }
}
