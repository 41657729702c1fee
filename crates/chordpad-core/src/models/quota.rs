//! Storage quota figures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Usage and quota reported by a storage estimator, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

/// Verdict of the quota guard for one prospective write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaCheck {
    pub can_write: bool,
    /// Above the warning threshold; informational only
    pub should_warn: bool,
    /// Usage before the write, as a percentage of quota
    pub current_percentage: f64,
    /// Usage after the write, as a percentage of quota
    pub projected_percentage: f64,
    /// Bytes left before the quota
    pub available_space: u64,
    /// Bytes the write needs
    pub required_space: u64,
}

impl QuotaCheck {
    /// Check used when no estimate is available; the write proceeds.
    pub const fn unknown(required_space: u64) -> Self {
        Self {
            can_write: true,
            should_warn: false,
            current_percentage: 0.0,
            projected_percentage: 0.0,
            available_space: 0,
            required_space,
        }
    }
}

/// Usage figures attached to a refused write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaExceeded {
    pub current_percentage: f64,
    pub projected_percentage: f64,
    pub available_space: u64,
    pub required_space: u64,
}

impl QuotaExceeded {
    /// Message suitable for showing to the person editing.
    pub fn user_message(&self) -> String {
        format!(
            "Local backup storage is full ({:.1}% used); your changes are kept in the editor but no backup copy could be written",
            self.current_percentage
        )
    }
}

impl From<QuotaCheck> for QuotaExceeded {
    fn from(check: QuotaCheck) -> Self {
        Self {
            current_percentage: check.current_percentage,
            projected_percentage: check.projected_percentage,
            available_space: check.available_space,
            required_space: check.required_space,
        }
    }
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% used, {:.1}% projected, {} bytes required, {} bytes available",
            self.current_percentage,
            self.projected_percentage,
            self.required_space,
            self.available_space
        )
    }
}
