//! Storage quota guard.
//!
//! Every draft write asks the guard first. The guard compares the write's
//! estimated size against the usage and quota reported by a
//! [`StorageEstimator`]. Estimates are approximate, so a failing estimator
//! never blocks a write, and the draft store keeps a reactive retry for
//! storage-full errors on top of this proactive check.

#![allow(clippy::cast_precision_loss)] // percentages of byte counts

use std::sync::Arc;

use crate::db::{DraftRepository, LibSqlDraftRepository, SharedDatabase};
use crate::error::Result;
use crate::models::{Draft, QuotaCheck, StorageEstimate};
use crate::BoxFuture;

/// Host-side storage estimation.
pub trait StorageEstimator: Send + Sync {
    fn estimate(&self) -> BoxFuture<'_, Result<StorageEstimate>>;
}

/// Measures bytes held by drafts in the local database against a budget.
pub struct DraftUsageEstimator {
    db: SharedDatabase,
    quota_bytes: u64,
}

impl DraftUsageEstimator {
    pub const fn new(db: SharedDatabase, quota_bytes: u64) -> Self {
        Self { db, quota_bytes }
    }
}

impl StorageEstimator for DraftUsageEstimator {
    fn estimate(&self) -> BoxFuture<'_, Result<StorageEstimate>> {
        Box::pin(async move {
            let db = self.db.lock().await;
            let usage = LibSqlDraftRepository::new(db.connection())
                .total_size()
                .await?;
            Ok(StorageEstimate {
                usage,
                quota: self.quota_bytes,
            })
        })
    }
}

/// Reports fixed figures, e.g. a quota snapshot handed over by the host.
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator(pub StorageEstimate);

impl FixedEstimator {
    pub const fn new(usage: u64, quota: u64) -> Self {
        Self(StorageEstimate { usage, quota })
    }
}

impl StorageEstimator for FixedEstimator {
    fn estimate(&self) -> BoxFuture<'_, Result<StorageEstimate>> {
        let estimate = self.0;
        Box::pin(async move { Ok(estimate) })
    }
}

/// Authorizes or rejects writes before they reach the draft store.
#[derive(Clone)]
pub struct QuotaGuard {
    estimator: Arc<dyn StorageEstimator>,
    warning_threshold: f64,
    hard_threshold: f64,
}

impl QuotaGuard {
    /// `warning_threshold` and `hard_threshold` are fractions of the quota.
    pub fn new(
        estimator: Arc<dyn StorageEstimator>,
        warning_threshold: f64,
        hard_threshold: f64,
    ) -> Self {
        Self {
            estimator,
            warning_threshold,
            hard_threshold,
        }
    }

    /// Check whether `estimated_bytes` more can be written.
    pub async fn check_before_write(&self, estimated_bytes: u64) -> QuotaCheck {
        let estimate = match self.estimator.estimate().await {
            Ok(estimate) => estimate,
            Err(error) => {
                tracing::warn!("Storage estimate unavailable, allowing write: {error}");
                return QuotaCheck::unknown(estimated_bytes);
            }
        };

        let check = evaluate(
            estimate,
            estimated_bytes,
            self.warning_threshold,
            self.hard_threshold,
        );

        if check.should_warn {
            tracing::warn!(
                "Draft storage at {:.1}% (projected {:.1}% after write)",
                check.current_percentage,
                check.projected_percentage
            );
        } else if !check.can_write {
            tracing::debug!(
                "Quota guard refused {} byte write: {:.1}% projected, {} bytes available",
                check.required_space,
                check.projected_percentage,
                check.available_space
            );
        }

        check
    }
}

/// Pure quota decision for one estimate.
pub fn evaluate(
    estimate: StorageEstimate,
    required: u64,
    warning_threshold: f64,
    hard_threshold: f64,
) -> QuotaCheck {
    if estimate.quota == 0 {
        return QuotaCheck::unknown(required);
    }

    let quota = estimate.quota as f64;
    let current_percentage = estimate.usage as f64 / quota * 100.0;
    let projected_percentage = estimate.usage.saturating_add(required) as f64 / quota * 100.0;
    let available_space = estimate.quota.saturating_sub(estimate.usage);

    let can_write = required <= available_space && projected_percentage <= hard_threshold * 100.0;
    let should_warn = can_write && projected_percentage >= warning_threshold * 100.0;

    QuotaCheck {
        can_write,
        should_warn,
        current_percentage,
        projected_percentage,
        available_space,
        required_space: required,
    }
}

/// Estimated bytes a draft occupies once written.
pub fn estimate_draft_size(draft: &Draft) -> u64 {
    let bytes = serde_json::to_vec(draft).map_or_else(
        |_| draft.content.len() + draft.parent_id.len() + draft.id.as_str().len(),
        |encoded| encoded.len(),
    );
    u64::try_from(bytes).unwrap_or(u64::MAX)
}
