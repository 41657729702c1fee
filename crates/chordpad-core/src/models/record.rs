//! Authoritative record model

use serde::{Deserialize, Serialize};

/// The durable copy of a chart, owned by the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeRecord {
    pub id: String,
    pub content: String,
    /// Incremented by the store on every accepted save
    pub version: i64,
    /// Last accepted save (Unix ms)
    pub updated_at: i64,
}

/// Outcome of a versioned write to the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSave {
    pub record: AuthoritativeRecord,
    pub new_version: i64,
}
