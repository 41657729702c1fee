//! Explicit context for draft persistence.
//!
//! A [`DraftContext`] is opened once per application and owns the draft
//! store, quota guard, persistence bridge and recovery comparator. Each open
//! editor gets an [`EditorSession`] with its own autosave driver.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::autosave::{AutosaveHandle, AutosaveSnapshot, SaveHandler, SaveTrigger, UnloadDecision};
use crate::bridge::{merge_changes, AuthoritativeStore, MergeResolution, MergeStrategy, PersistenceBridge};
use crate::clock::{Clock, SystemClock};
use crate::config::DraftConfig;
use crate::db::SharedDatabase;
use crate::drafts::DraftStore;
use crate::error::{Error, Result};
use crate::models::{
    AuthoritativeRecord, Draft, SaveFailure, SaveFailureKind, SaveResult, SweepReport,
};
use crate::quota::{DraftUsageEstimator, QuotaGuard, StorageEstimator};
use crate::recovery::{DraftPreview, RecoveryCheck, RecoveryComparator};
use crate::state::SaveStatus;
use crate::BoxFuture;

/// Application-wide draft persistence context.
pub struct DraftContext {
    config: Arc<DraftConfig>,
    clock: Arc<dyn Clock>,
    records: Arc<dyn AuthoritativeStore>,
    drafts: DraftStore,
    bridge: PersistenceBridge,
    recovery: RecoveryComparator,
}

impl DraftContext {
    /// Open with the system clock, measuring usage from the draft table.
    pub async fn open(
        db: SharedDatabase,
        records: Arc<dyn AuthoritativeStore>,
        config: DraftConfig,
    ) -> Result<Self> {
        let estimator = Arc::new(DraftUsageEstimator::new(
            db.clone(),
            config.storage_quota_bytes,
        ));
        Self::open_with(db, records, config, Arc::new(SystemClock), estimator).await
    }

    pub async fn open_with(
        db: SharedDatabase,
        records: Arc<dyn AuthoritativeStore>,
        config: DraftConfig,
        clock: Arc<dyn Clock>,
        estimator: Arc<dyn StorageEstimator>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let guard = QuotaGuard::new(estimator, config.warning_threshold, config.hard_threshold);
        let drafts = DraftStore::new(db, guard, Arc::clone(&config), Arc::clone(&clock));
        let bridge = PersistenceBridge::new(Arc::clone(&records), drafts.clone());
        let recovery = RecoveryComparator::new(drafts.clone(), Arc::clone(&records));

        let context = Self {
            config,
            clock,
            records,
            drafts,
            bridge,
            recovery,
        };
        context.maintain("open").await;
        Ok(context)
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    pub const fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    pub const fn bridge(&self) -> &PersistenceBridge {
        &self.bridge
    }

    pub const fn recovery(&self) -> &RecoveryComparator {
        &self.recovery
    }

    /// Start editing `parent_id`.
    ///
    /// The record's current content and version seed the committed
    /// baseline. A record that does not exist yet starts from empty text.
    pub async fn open_editor(&self, parent_id: &str) -> Result<EditorSession> {
        if parent_id.trim().is_empty() {
            return Err(Error::InvalidInput("parent id cannot be empty".into()));
        }

        let record = self.records.get_by_id(parent_id).await?;
        let (committed, base_version) = record.map_or((String::new(), None), |record| {
            (record.content, Some(record.version))
        });

        let handler = Arc::new(SessionSaveHandler {
            parent_id: parent_id.to_string(),
            drafts: self.drafts.clone(),
            bridge: self.bridge.clone(),
            base_version: Mutex::new(base_version),
        });
        let autosave = AutosaveHandle::spawn(
            handler.clone(),
            Arc::clone(&self.clock),
            &self.config,
            committed,
        );

        tracing::debug!("Opened editor for {parent_id} at {base_version:?}");
        Ok(EditorSession {
            parent_id: parent_id.to_string(),
            autosave,
            handler,
            records: Arc::clone(&self.records),
            recovery: self.recovery.clone(),
        })
    }

    /// Expiry purge and global LRU cap.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.drafts.sweep().await
    }

    /// Run a final sweep and release the context.
    pub async fn close(self) {
        self.maintain("close").await;
        tracing::debug!("Draft context closed");
    }

    async fn maintain(&self, stage: &str) {
        match self.drafts.sweep().await {
            Ok(report) if report.expired + report.evicted > 0 => tracing::info!(
                "Draft sweep on {stage}: {} expired, {} evicted",
                report.expired,
                report.evicted
            ),
            Ok(_) => {}
            Err(error) => tracing::warn!("Draft sweep on {stage} failed: {error}"),
        }
    }
}

/// Saves on behalf of one editor's autosave driver.
struct SessionSaveHandler {
    parent_id: String,
    drafts: DraftStore,
    bridge: PersistenceBridge,
    /// Record version the working content is based on
    base_version: Mutex<Option<i64>>,
}

impl SessionSaveHandler {
    async fn checkpoint(&self, content: &str) -> SaveResult {
        match self.drafts.save(&self.parent_id, content, true).await {
            Ok(Some(draft)) => SaveResult::checkpointed(draft, self.drafts.now()),
            Ok(None) => {
                tracing::debug!("Draft storage not ready, {} not backed up", self.parent_id);
                SaveResult::failed(
                    SaveFailure::new(
                        SaveFailureKind::Store,
                        "draft storage is not ready; checkpoint skipped",
                    ),
                    self.drafts.now(),
                )
            }
            Err(error) => {
                let failure = SaveFailure::from_error(&error);
                tracing::warn!(
                    "Local backup for {} degraded, editing continues: {}",
                    self.parent_id,
                    failure.message
                );
                SaveResult::failed(failure, self.drafts.now())
            }
        }
    }

    async fn commit(&self, content: &str) -> SaveResult {
        if let Err(error) = self.drafts.save(&self.parent_id, content, false).await {
            tracing::warn!("Manual checkpoint for {} skipped: {error}", self.parent_id);
        }

        let base_version = *self.base_version.lock().await;
        let result = self
            .bridge
            .save_to_authoritative(&self.parent_id, content, base_version)
            .await;

        if let Some(record) = &result.record {
            *self.base_version.lock().await = Some(record.version);
        }
        result
    }

    async fn set_base_version(&self, version: i64) {
        *self.base_version.lock().await = Some(version);
    }
}

impl SaveHandler for SessionSaveHandler {
    fn save(&self, content: String, trigger: SaveTrigger) -> BoxFuture<'_, SaveResult> {
        Box::pin(async move {
            if trigger.is_auto() {
                self.checkpoint(&content).await
            } else {
                self.commit(&content).await
            }
        })
    }
}

/// How a conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// Local content was saved again on top of the remote version
    Saved(SaveResult),
    /// The working content was replaced by the remote record
    Reverted(AuthoritativeRecord),
    /// Nothing changed; both sides need user review
    Review { local: String, remote: String },
}

/// Draft persistence surface for one open editor.
pub struct EditorSession {
    parent_id: String,
    autosave: AutosaveHandle,
    handler: Arc<SessionSaveHandler>,
    records: Arc<dyn AuthoritativeStore>,
    recovery: RecoveryComparator,
}

impl EditorSession {
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn content_changed(&self, content: impl Into<String>) -> Result<()> {
        self.autosave.content_changed(content)
    }

    pub fn status(&self) -> SaveStatus {
        self.autosave.status()
    }

    pub fn snapshot(&self) -> AutosaveSnapshot {
        self.autosave.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveSnapshot> {
        self.autosave.subscribe()
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.autosave.snapshot().last_saved_at
    }

    pub fn last_error(&self) -> Option<String> {
        self.autosave.snapshot().last_error
    }

    /// Working content differs from the committed record.
    pub fn is_dirty(&self) -> bool {
        self.autosave.snapshot().dirty
    }

    pub fn set_autosave_enabled(&self, enabled: bool) -> Result<()> {
        self.autosave.set_enabled(enabled)
    }

    /// Checkpoint locally and commit to the record now.
    pub async fn force_save(&self) -> Result<SaveResult> {
        self.autosave.force_save().await
    }

    pub async fn get_latest_draft(&self) -> Result<Option<Draft>> {
        self.handler.drafts.get_latest(&self.parent_id).await
    }

    pub async fn clear_drafts(&self) -> Result<u64> {
        self.handler.drafts.delete_all_for_parent(&self.parent_id).await
    }

    pub async fn check_for_draft(&self) -> Result<RecoveryCheck> {
        self.recovery.check_for_draft(&self.parent_id).await
    }

    /// Load the latest draft into the working content.
    pub async fn apply_draft(&self) -> Result<Option<String>> {
        let content = self.recovery.apply_draft(&self.parent_id).await?;
        if let Some(content) = &content {
            self.autosave.content_changed(content.clone())?;
        }
        Ok(content)
    }

    pub async fn discard_draft(&self) -> Result<u64> {
        self.recovery.discard_draft(&self.parent_id).await
    }

    pub async fn get_preview(&self, max_lines: Option<usize>) -> Result<Option<DraftPreview>> {
        self.recovery.get_preview(&self.parent_id, max_lines).await
    }

    /// Settle the pending conflict with a whole-document choice.
    pub async fn resolve_conflict(&self, strategy: MergeStrategy) -> Result<ConflictOutcome> {
        let conflict = self
            .autosave
            .snapshot()
            .conflict
            .ok_or_else(|| Error::InvalidInput("no conflict to resolve".into()))?;

        match merge_changes(&conflict, strategy) {
            MergeResolution::Retry { base_version, .. } => {
                self.handler.set_base_version(base_version).await;
                self.autosave.clear_conflict()?;
                let result = self.autosave.force_save().await?;
                Ok(ConflictOutcome::Saved(result))
            }
            MergeResolution::AcceptRemote { .. } => {
                let record = self
                    .records
                    .get_by_id(&self.parent_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(self.parent_id.clone()))?;

                self.handler.set_base_version(record.version).await;
                self.autosave.mark_committed(record.content.clone())?;
                // A checkpoint still running would land after the delete.
                self.autosave.settle().await?;
                self.handler
                    .drafts
                    .delete_all_for_parent(&self.parent_id)
                    .await?;
                self.autosave.clear_conflict()?;
                tracing::info!("Replaced local edits of {} with v{}", self.parent_id, record.version);
                Ok(ConflictOutcome::Reverted(record))
            }
            MergeResolution::NeedsReview { local, remote } => {
                Ok(ConflictOutcome::Review { local, remote })
            }
        }
    }

    pub fn visibility_hidden(&self) -> Result<()> {
        self.autosave.visibility_hidden()
    }

    pub async fn before_unload(&self) -> Result<UnloadDecision> {
        self.autosave.before_unload().await
    }

    /// Stop the autosave driver; a save in flight still completes.
    pub fn close(self) {
        self.autosave.shutdown();
        tracing::debug!("Closed editor for {}", self.parent_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bridge::LibSqlRecordStore;
    use crate::clock::ManualClock;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    const T: i64 = 1_700_000_000_000;

    struct Fixture {
        context: DraftContext,
        records: LibSqlRecordStore,
        clock: ManualClock,
        db: SharedDatabase,
    }

    async fn open_context(db: SharedDatabase, clock: &ManualClock) -> (DraftContext, LibSqlRecordStore) {
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let records = LibSqlRecordStore::new(db.clone(), shared_clock.clone());
        let config = DraftConfig::default();
        let estimator = Arc::new(DraftUsageEstimator::new(
            db.clone(),
            config.storage_quota_bytes,
        ));
        let context = DraftContext::open_with(
            db,
            Arc::new(records.clone()),
            config,
            shared_clock,
            estimator,
        )
        .await
        .unwrap();
        (context, records)
    }

    async fn setup() -> Fixture {
        let clock = ManualClock::new(T);
        let db = Database::open_in_memory().await.unwrap().into_shared();
        let (context, records) = open_context(db.clone(), &clock).await;
        Fixture {
            context,
            records,
            clock,
            db,
        }
    }

    #[tokio::test]
    async fn open_sweeps_expired_drafts() {
        let fixture = setup().await;
        fixture.context.drafts().save("song-1", "old", true).await.unwrap();
        fixture
            .clock
            .advance(fixture.context.config().retention_window_millis());

        let (reopened, _) = open_context(fixture.db.clone(), &fixture.clock).await;
        assert_eq!(reopened.drafts().stats().await.unwrap().total_drafts, 0);
        reopened.close().await;
    }

    #[tokio::test]
    async fn force_save_commits_and_clears_drafts() {
        let fixture = setup().await;
        fixture.records.create_record("song-1", "[C]v1").await.unwrap();
        let session = fixture.context.open_editor("song-1").await.unwrap();
        assert!(!session.is_dirty());

        session.content_changed("[C]v2").unwrap();
        let result = session.force_save().await.unwrap();

        assert!(result.success);
        assert_eq!(result.record.as_ref().map(|r| r.version), Some(2));
        assert_eq!(session.status(), SaveStatus::Saved);
        assert!(!session.is_dirty());
        assert!(session.get_latest_draft().await.unwrap().is_none());
        session.close();
    }

    #[tokio::test]
    async fn conflict_blocks_saves_until_local_wins() {
        let fixture = setup().await;
        fixture.records.create_record("song-1", "base").await.unwrap();
        let session = fixture.context.open_editor("song-1").await.unwrap();

        fixture
            .records
            .save_versioned("song-1", "remote-X", None)
            .await
            .unwrap();

        session.content_changed("mine").unwrap();
        let result = session.force_save().await.unwrap();
        assert!(result.conflict_detected);
        assert_eq!(session.status(), SaveStatus::Conflict);
        assert!(matches!(
            session.force_save().await,
            Err(Error::UnresolvedConflict)
        ));

        let review = session.resolve_conflict(MergeStrategy::Manual).await.unwrap();
        assert_eq!(
            review,
            ConflictOutcome::Review {
                local: "mine".to_string(),
                remote: "remote-X".to_string(),
            }
        );
        assert_eq!(session.status(), SaveStatus::Conflict);

        let ConflictOutcome::Saved(saved) =
            session.resolve_conflict(MergeStrategy::Local).await.unwrap()
        else {
            panic!("expected a save");
        };
        let record = saved.record.unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.content, "mine");
        assert_eq!(session.status(), SaveStatus::Saved);
    }

    #[tokio::test]
    async fn remote_resolution_replaces_local_work() {
        let fixture = setup().await;
        fixture.records.create_record("song-1", "base").await.unwrap();
        let session = fixture.context.open_editor("song-1").await.unwrap();
        fixture
            .records
            .save_versioned("song-1", "theirs", None)
            .await
            .unwrap();

        session.content_changed("mine").unwrap();
        session.force_save().await.unwrap();

        let outcome = session.resolve_conflict(MergeStrategy::Remote).await.unwrap();
        let ConflictOutcome::Reverted(record) = outcome else {
            panic!("expected remote content");
        };
        assert_eq!(record.content, "theirs");
        assert!(session.get_latest_draft().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!session.is_dirty());
        assert_ne!(session.status(), SaveStatus::Conflict);

        session.content_changed("theirs, edited").unwrap();
        let result = session.force_save().await.unwrap();
        assert_eq!(result.record.unwrap().version, 3);
    }

    #[tokio::test]
    async fn recovery_applies_newer_draft() {
        let fixture = setup().await;
        fixture.records.create_record("song-1", "A").await.unwrap();
        fixture.clock.advance(10);
        fixture.context.drafts().save("song-1", "B", true).await.unwrap();

        let session = fixture.context.open_editor("song-1").await.unwrap();
        let check = session.check_for_draft().await.unwrap();
        assert!(check.should_offer);

        let preview = session.get_preview(None).await.unwrap().unwrap();
        assert_eq!(preview.draft.text, "B");

        assert_eq!(session.apply_draft().await.unwrap().as_deref(), Some("B"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.is_dirty());
        assert!(session.get_latest_draft().await.unwrap().is_some());

        assert_eq!(session.discard_draft().await.unwrap(), 1);
        assert!(!session.check_for_draft().await.unwrap().has_draft);
    }

    #[tokio::test]
    async fn hidden_editor_writes_auto_checkpoint() {
        let fixture = setup().await;
        fixture.records.create_record("song-1", "A").await.unwrap();
        let session = fixture.context.open_editor("song-1").await.unwrap();
        let mut updates = session.subscribe();

        session.content_changed("[F]bridge").unwrap();
        session.visibility_hidden().unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|snapshot| snapshot.status == SaveStatus::Saved),
        )
        .await
        .unwrap()
        .unwrap();

        let draft = session.get_latest_draft().await.unwrap().unwrap();
        assert_eq!(draft.content, "[F]bridge");
        assert!(draft.is_auto_save);
        assert!(session.is_dirty());
        assert_eq!(session.last_saved_at(), Some(T));
        assert_eq!(session.last_error(), None);
    }

    /// Record store with no charts, for databases without the records table.
    struct EmptyRecords;

    impl AuthoritativeStore for EmptyRecords {
        fn get_by_id<'a>(
            &'a self,
            _id: &'a str,
        ) -> BoxFuture<'a, Result<Option<AuthoritativeRecord>>> {
            Box::pin(async { Ok(None) })
        }

        fn save_versioned<'a>(
            &'a self,
            id: &'a str,
            _content: &'a str,
            _expected_version: Option<i64>,
        ) -> BoxFuture<'a, Result<crate::models::VersionedSave>> {
            Box::pin(async move { Err(Error::NotFound(id.to_string())) })
        }
    }

    #[tokio::test]
    async fn unready_store_does_not_report_a_checkpoint() {
        let clock = ManualClock::new(T);
        let db = Database::open_in_memory_deferred().await.unwrap().into_shared();
        let context = DraftContext::open_with(
            db.clone(),
            Arc::new(EmptyRecords),
            DraftConfig::default(),
            Arc::new(clock.clone()),
            Arc::new(crate::quota::FixedEstimator::new(0, 1_000_000)),
        )
        .await
        .unwrap();
        let session = context.open_editor("song-1").await.unwrap();
        let mut updates = session.subscribe();

        session.content_changed("unsaved work").unwrap();
        session.visibility_hidden().unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|snapshot| snapshot.status == SaveStatus::Error),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(session.last_saved_at(), None);
        assert!(session.last_error().unwrap().contains("not ready"));
        assert!(session.is_dirty());

        db.lock().await.migrate().await.unwrap();
        session.visibility_hidden().unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|snapshot| snapshot.status == SaveStatus::Saved),
        )
        .await
        .unwrap()
        .unwrap();

        let draft = session.get_latest_draft().await.unwrap().unwrap();
        assert_eq!(draft.content, "unsaved work");
        assert_eq!(session.last_saved_at(), Some(T));
        assert_eq!(session.last_error(), None);
    }

    #[tokio::test]
    async fn missing_record_fails_manual_save_terminally() {
        let fixture = setup().await;
        let session = fixture.context.open_editor("song-new").await.unwrap();

        session.content_changed("fresh").unwrap();
        let result = session.force_save().await.unwrap();

        assert!(!result.success);
        assert!(!result.error.unwrap().retryable);
        assert_eq!(session.status(), SaveStatus::Error);
        assert_eq!(
            session.get_latest_draft().await.unwrap().unwrap().content,
            "fresh"
        );
    }
}
