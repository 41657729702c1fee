//! Crash recovery.
//!
//! On editor entry the newest live draft is compared with the
//! authoritative record. A draft is offered back to the user only when it is
//! strictly newer than the record and its text actually differs.

use std::sync::Arc;

use serde::Serialize;

use crate::bridge::AuthoritativeStore;
use crate::drafts::DraftStore;
use crate::error::Result;
use crate::models::{AuthoritativeRecord, Draft};

/// Marker line appended to truncated previews.
pub const TRUNCATION_MARKER: &str = "…";

/// Result of comparing the latest draft with the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryCheck {
    pub has_draft: bool,
    pub should_offer: bool,
    pub draft: Option<Draft>,
    pub record: Option<AuthoritativeRecord>,
}

/// First lines of a text for side-by-side display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPreview {
    /// Kept lines, followed by the marker line when truncated
    pub text: String,
    pub total_lines: usize,
    pub truncated: bool,
}

impl TextPreview {
    pub fn new(content: &str, max_lines: usize) -> Self {
        let lines = content.lines().collect::<Vec<_>>();
        let total_lines = lines.len();
        let truncated = total_lines > max_lines;

        let mut text = lines[..total_lines.min(max_lines)].join("\n");
        if truncated {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(TRUNCATION_MARKER);
        }

        Self {
            text,
            total_lines,
            truncated,
        }
    }
}

/// Draft and record previews shown in the recovery dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftPreview {
    pub draft: TextPreview,
    pub record: Option<TextPreview>,
    pub draft_saved_at: i64,
    pub record_updated_at: Option<i64>,
}

/// Whether `draft` should be offered over `record`.
///
/// Without a record there is nothing to lose by offering a non-empty draft.
pub fn should_offer(draft: &Draft, record: Option<&AuthoritativeRecord>) -> bool {
    match record {
        Some(record) => draft.saved_at > record.updated_at && draft.content != record.content,
        None => !draft.content.is_empty(),
    }
}

/// Decides whether local work should be offered back on editor entry.
#[derive(Clone)]
pub struct RecoveryComparator {
    drafts: DraftStore,
    records: Arc<dyn AuthoritativeStore>,
    preview_lines: usize,
}

impl RecoveryComparator {
    pub fn new(drafts: DraftStore, records: Arc<dyn AuthoritativeStore>) -> Self {
        let preview_lines = drafts.config().preview_lines;
        Self {
            drafts,
            records,
            preview_lines,
        }
    }

    /// Load the latest draft and the record together and compare them.
    pub async fn check_for_draft(&self, parent_id: &str) -> Result<RecoveryCheck> {
        let (draft, record) = tokio::join!(
            self.drafts.get_latest(parent_id),
            self.records.get_by_id(parent_id)
        );

        let now = self.drafts.now();
        let draft = draft
            .unwrap_or_else(|error| {
                tracing::warn!("Could not read drafts for {parent_id}: {error}");
                None
            })
            .filter(|draft| !draft.is_expired(now));
        let record = record?;

        let Some(draft) = draft else {
            return Ok(RecoveryCheck {
                record,
                ..RecoveryCheck::default()
            });
        };

        let offer = should_offer(&draft, record.as_ref());
        if offer {
            tracing::info!(
                "Offering recovery of draft {} for {parent_id} saved at {}",
                draft.id,
                draft.saved_at
            );
        }

        Ok(RecoveryCheck {
            has_draft: true,
            should_offer: offer,
            draft: Some(draft),
            record,
        })
    }

    /// Content of the latest draft. The draft stays stored until the next
    /// successful commit clears it.
    pub async fn apply_draft(&self, parent_id: &str) -> Result<Option<String>> {
        Ok(self
            .drafts
            .get_latest(parent_id)
            .await?
            .map(|draft| draft.content))
    }

    /// Drop every draft for `parent_id`.
    pub async fn discard_draft(&self, parent_id: &str) -> Result<u64> {
        let discarded = self.drafts.delete_all_for_parent(parent_id).await?;
        tracing::info!("Discarded {discarded} drafts for {parent_id}");
        Ok(discarded)
    }

    /// Truncated previews of the latest draft and the record.
    pub async fn get_preview(
        &self,
        parent_id: &str,
        max_lines: Option<usize>,
    ) -> Result<Option<DraftPreview>> {
        let max_lines = max_lines.unwrap_or(self.preview_lines);
        let check = self.check_for_draft(parent_id).await?;

        Ok(check.draft.map(|draft| DraftPreview {
            draft: TextPreview::new(&draft.content, max_lines),
            record: check
                .record
                .as_ref()
                .map(|record| TextPreview::new(&record.content, max_lines)),
            draft_saved_at: draft.saved_at,
            record_updated_at: check.record.as_ref().map(|record| record.updated_at),
        }))
    }
}
