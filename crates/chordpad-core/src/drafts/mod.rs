//! Draft store.
//!
//! Local checkpoints of in-progress edits, scoped to a parent record. The
//! store enforces three retention bounds: a per-parent count cap applied on
//! every write, an absolute expiry applied on every read, and a global
//! least-recently-used cap applied by sweeps. Writes are quota guarded.
//!
//! An unready store (drafts table missing while a migration is in flight)
//! never surfaces as an error: reads come back empty and writes return
//! `Ok(None)`, so the editor keeps working from memory.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::DraftConfig;
use crate::db::{DraftRepository, LibSqlDraftRepository, SharedDatabase};
use crate::error::{Error, Result};
use crate::models::{Draft, DraftStats, QuotaExceeded, SweepReport};
use crate::quota::{estimate_draft_size, QuotaGuard};

/// Persistence unit for draft checkpoints.
#[derive(Clone)]
pub struct DraftStore {
    db: SharedDatabase,
    guard: QuotaGuard,
    config: Arc<DraftConfig>,
    clock: Arc<dyn Clock>,
}

impl DraftStore {
    pub fn new(
        db: SharedDatabase,
        guard: QuotaGuard,
        config: Arc<DraftConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            guard,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Write a new checkpoint for `parent_id`.
    ///
    /// Returns `Ok(None)` when the store is not ready; the caller should
    /// keep editing. Fails with `Error::QuotaExceeded` only after one
    /// emergency purge of expired drafts did not free enough room.
    pub async fn save(
        &self,
        parent_id: &str,
        content: &str,
        is_auto_save: bool,
    ) -> Result<Option<Draft>> {
        if parent_id.trim().is_empty() {
            return Err(Error::InvalidInput("parent id cannot be empty".into()));
        }

        let draft = Draft::new(
            parent_id,
            content,
            is_auto_save,
            self.now(),
            self.config.retention_window_millis(),
        );
        let size = estimate_draft_size(&draft);
        let mut purged = false;

        let check = self.guard.check_before_write(size).await;
        if !check.can_write {
            tracing::info!(
                "Draft for {parent_id} exceeds storage budget; purging expired drafts and retrying"
            );
            self.purge_expired().await?;
            purged = true;

            let retry = self.guard.check_before_write(size).await;
            if !retry.can_write {
                tracing::warn!("Draft for {parent_id} not written: {}", QuotaExceeded::from(retry));
                return Err(Error::QuotaExceeded(retry.into()));
            }
        }

        match self.write(&draft, size).await {
            Ok(evicted) => {
                if evicted > 0 {
                    tracing::debug!("Evicted {evicted} old drafts for {parent_id}");
                }
                tracing::debug!("Saved draft {} ({size} bytes)", draft.id);
                Ok(Some(draft))
            }
            Err(error) if error.is_store_unavailable() => {
                tracing::info!("Draft store not ready; skipping checkpoint for {parent_id}: {error}");
                Ok(None)
            }
            Err(error) if error.is_storage_full() && !purged => {
                tracing::warn!("Storage full while writing draft for {parent_id}; purging expired drafts and retrying");
                self.purge_expired().await?;
                match self.write(&draft, size).await {
                    Ok(_) => Ok(Some(draft)),
                    Err(retry) if retry.is_storage_full() => {
                        let figures = self.guard.check_before_write(size).await;
                        Err(Error::QuotaExceeded(figures.into()))
                    }
                    Err(retry) => Err(retry),
                }
            }
            Err(error) if error.is_storage_full() => {
                let figures = self.guard.check_before_write(size).await;
                Err(Error::QuotaExceeded(figures.into()))
            }
            Err(error) => Err(error),
        }
    }

    /// Enforce the per-parent cap and insert, in one transaction.
    async fn write(&self, draft: &Draft, size: u64) -> Result<u64> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let repo = LibSqlDraftRepository::new(conn);
        let cap = self.config.max_drafts_per_entity;

        conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = async {
            let existing = repo.count_for_parent(&draft.parent_id).await?;
            let excess = (existing + 1).saturating_sub(cap);
            let evicted = repo
                .delete_oldest_for_parent(&draft.parent_id, excess)
                .await?;
            repo.insert(draft, size).await?;
            Ok::<u64, Error>(evicted)
        }
        .await;

        match result {
            Ok(evicted) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(evicted)
            }
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    /// Newest non-expired draft for `parent_id`.
    pub async fn get_latest(&self, parent_id: &str) -> Result<Option<Draft>> {
        Ok(self.list_for_parent(parent_id).await?.into_iter().next())
    }

    /// Non-expired drafts for `parent_id`, newest first.
    ///
    /// Every returned draft has its `last_accessed_at` refreshed.
    pub async fn list_for_parent(&self, parent_id: &str) -> Result<Vec<Draft>> {
        let now = self.now();
        let result = async {
            let db = self.db.lock().await;
            let repo = LibSqlDraftRepository::new(db.connection());
            let mut drafts = repo.list_live_for_parent(parent_id, now).await?;
            if !drafts.is_empty() {
                repo.touch_live_for_parent(parent_id, now).await?;
                for draft in &mut drafts {
                    draft.last_accessed_at = now;
                }
            }
            Ok(drafts)
        }
        .await;

        tolerate_unready(result, "list")
    }

    /// Delete every draft of `parent_id`.
    pub async fn delete_all_for_parent(&self, parent_id: &str) -> Result<u64> {
        let result = async {
            let db = self.db.lock().await;
            LibSqlDraftRepository::new(db.connection())
                .delete_for_parent(parent_id)
                .await
        }
        .await;

        let deleted = tolerate_unready(result, "delete")?;
        if deleted > 0 {
            tracing::debug!("Deleted {deleted} drafts for {parent_id}");
        }
        Ok(deleted)
    }

    /// Delete drafts whose expiry has passed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = self.now();
        let result = async {
            let db = self.db.lock().await;
            LibSqlDraftRepository::new(db.connection())
                .delete_expired(now)
                .await
        }
        .await;

        let purged = tolerate_unready(result, "purge")?;
        if purged > 0 {
            tracing::info!("Purged {purged} expired drafts");
        }
        Ok(purged)
    }

    /// Evict least recently accessed drafts until at most `target_total` remain.
    pub async fn purge_by_lru(&self, target_total: u64) -> Result<u64> {
        let result = async {
            let db = self.db.lock().await;
            let repo = LibSqlDraftRepository::new(db.connection());
            let total = repo.count().await?;
            if total <= target_total {
                return Ok(0);
            }
            repo.delete_least_recently_accessed(total - target_total)
                .await
        }
        .await;

        let evicted = tolerate_unready(result, "lru purge")?;
        if evicted > 0 {
            tracing::info!("Evicted {evicted} least recently used drafts (target {target_total})");
        }
        Ok(evicted)
    }

    /// Expiry purge followed by the global LRU cap.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let expired = self.purge_expired().await?;
        let evicted = self.purge_by_lru(self.config.global_lru_target).await?;
        Ok(SweepReport { expired, evicted })
    }

    /// Diagnostic counts; zeros when the store is not ready.
    pub async fn stats(&self) -> Result<DraftStats> {
        let now = self.now();
        let result = async {
            let db = self.db.lock().await;
            LibSqlDraftRepository::new(db.connection()).stats(now).await
        }
        .await;

        tolerate_unready(result, "stats")
    }
}

fn tolerate_unready<T: Default>(result: Result<T>, operation: &str) -> Result<T> {
    match result {
        Err(error) if error.is_store_unavailable() => {
            tracing::info!("Draft store not ready during {operation}: {error}");
            Ok(T::default())
        }
        other => other,
    }
}
