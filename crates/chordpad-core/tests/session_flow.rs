//! End-to-end draft persistence against a file-backed database.

use std::sync::Arc;

use chordpad_core::bridge::LibSqlRecordStore;
use chordpad_core::db::{Database, SharedDatabase};
use chordpad_core::quota::{DraftUsageEstimator, FixedEstimator, StorageEstimator};
use chordpad_core::{
    AuthoritativeStore, Clock, DraftConfig, DraftContext, Error, ManualClock, MergeStrategy,
    SaveStatus,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const T: i64 = 1_700_000_000_000;

struct Harness {
    _dir: TempDir,
    db: SharedDatabase,
    clock: ManualClock,
    records: LibSqlRecordStore,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("chordpad.db"))
            .await
            .unwrap()
            .into_shared();
        let clock = ManualClock::new(T);
        let records = LibSqlRecordStore::new(db.clone(), Arc::new(clock.clone()));
        Self {
            _dir: dir,
            db,
            clock,
            records,
        }
    }

    async fn context(&self, config: DraftConfig) -> DraftContext {
        let estimator: Arc<dyn StorageEstimator> = Arc::new(DraftUsageEstimator::new(
            self.db.clone(),
            config.storage_quota_bytes,
        ));
        self.context_with(config, estimator).await
    }

    async fn context_with(
        &self,
        config: DraftConfig,
        estimator: Arc<dyn StorageEstimator>,
    ) -> DraftContext {
        let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
        DraftContext::open_with(
            self.db.clone(),
            Arc::new(self.records.clone()),
            config,
            clock,
            estimator,
        )
        .await
        .unwrap()
    }
}

#[tokio::test]
async fn per_parent_cap_keeps_the_two_newest_drafts() {
    let harness = Harness::new().await;
    let context = harness
        .context(DraftConfig {
            max_drafts_per_entity: 2,
            ..DraftConfig::default()
        })
        .await;
    let drafts = context.drafts();

    let d1 = drafts.save("song-1", "v1", true).await.unwrap().unwrap();
    harness.clock.advance(1);
    let d2 = drafts.save("song-1", "v2", true).await.unwrap().unwrap();
    harness.clock.advance(1);
    let d3 = drafts.save("song-1", "v3", true).await.unwrap().unwrap();

    let held = drafts.list_for_parent("song-1").await.unwrap();
    let ids = held.iter().map(|draft| &draft.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![&d3.id, &d2.id]);
    assert!(!ids.contains(&&d1.id));
}

#[tokio::test]
async fn crash_recovery_then_commit() {
    let harness = Harness::new().await;
    harness
        .records
        .create_record("song-1", "[G]Amazing grace")
        .await
        .unwrap();

    // First run: edits are checkpointed but never committed.
    {
        let context = harness.context(DraftConfig::default()).await;
        let session = context.open_editor("song-1").await.unwrap();
        harness.clock.advance(1_000);
        session
            .content_changed("[G]Amazing grace, how [C]sweet")
            .unwrap();
        session.visibility_hidden().unwrap();

        let mut updates = session.subscribe();
        updates
            .wait_for(|snapshot| snapshot.status == SaveStatus::Saved)
            .await
            .unwrap();
        session.close();
        context.close().await;
    }

    // Second run: the draft is newer and different, so it is offered back.
    let context = harness.context(DraftConfig::default()).await;
    let session = context.open_editor("song-1").await.unwrap();
    let check = session.check_for_draft().await.unwrap();
    assert!(check.should_offer);

    let restored = session.apply_draft().await.unwrap().unwrap();
    assert_eq!(restored, "[G]Amazing grace, how [C]sweet");

    let result = session.force_save().await.unwrap();
    assert!(result.success);
    assert_eq!(result.record.unwrap().version, 2);
    assert!(!session.check_for_draft().await.unwrap().has_draft);
}

#[tokio::test]
async fn concurrent_writer_forces_a_choice() {
    let harness = Harness::new().await;
    harness.records.create_record("song-1", "base").await.unwrap();
    let context = harness.context(DraftConfig::default()).await;
    let session = context.open_editor("song-1").await.unwrap();

    for text in ["other tab 1", "other tab 2", "remote-X", "remote-X"] {
        harness
            .records
            .save_versioned("song-1", text, None)
            .await
            .unwrap();
    }

    session.content_changed("mine").unwrap();
    let result = session.force_save().await.unwrap();
    let conflict = result.conflict_data.unwrap();
    assert_eq!(conflict.remote, "remote-X");
    assert_eq!(conflict.local_version, 1);
    assert_eq!(conflict.remote_version, 5);
    assert!(matches!(
        session.force_save().await,
        Err(Error::UnresolvedConflict)
    ));

    session.resolve_conflict(MergeStrategy::Local).await.unwrap();
    let live = harness.records.get_by_id("song-1").await.unwrap().unwrap();
    assert_eq!(live.content, "mine");
    assert_eq!(live.version, 6);
}

#[tokio::test]
async fn exhausted_quota_degrades_backup_without_blocking_edits() {
    let harness = Harness::new().await;
    harness.records.create_record("song-1", "base").await.unwrap();
    let context = harness
        .context_with(
            DraftConfig::default(),
            Arc::new(FixedEstimator::new(1_000, 1_000)),
        )
        .await;
    let session = context.open_editor("song-1").await.unwrap();

    session.content_changed("verse two").unwrap();
    session.visibility_hidden().unwrap();
    let mut updates = session.subscribe();
    let snapshot = updates
        .wait_for(|snapshot| snapshot.status == SaveStatus::Error)
        .await
        .unwrap()
        .clone();
    assert!(snapshot.last_error.unwrap().contains("backup storage is full"));

    // The authoritative save still goes through.
    let result = session.force_save().await.unwrap();
    assert!(result.success);
    assert_eq!(session.status(), SaveStatus::Saved);

    let failure = context
        .drafts()
        .save("song-1", "more", true)
        .await
        .unwrap_err();
    assert!(matches!(failure, Error::QuotaExceeded(_)));
}
