//! Persistence bridge.
//!
//! Commits editor content to the authoritative record store under
//! optimistic versioning and retires the local drafts the commit
//! supersedes. Conflicts come back as `SaveResult` outcomes; they are never
//! merged here.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::clock::Clock;
use crate::db::{LibSqlRecordRepository, RecordRepository, SharedDatabase};
use crate::drafts::DraftStore;
use crate::error::{Error, Result};
use crate::models::{
    AuthoritativeRecord, ConflictData, SaveFailure, SaveFailureKind, SaveResult, VersionedSave,
};
use crate::BoxFuture;

/// The durable record store the editor ultimately saves into.
pub trait AuthoritativeStore: Send + Sync {
    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<AuthoritativeRecord>>>;

    /// Write `content` and bump the version atomically.
    ///
    /// With `expected_version`, a store whose live version differs must fail
    /// with `Error::VersionMismatch`.
    fn save_versioned<'a>(
        &'a self,
        id: &'a str,
        content: &'a str,
        expected_version: Option<i64>,
    ) -> BoxFuture<'a, Result<VersionedSave>>;
}

/// Record store kept in the local libSQL database.
#[derive(Clone)]
pub struct LibSqlRecordStore {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
}

impl LibSqlRecordStore {
    pub fn new(db: SharedDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create a record at version 1.
    pub async fn create_record(&self, id: &str, content: &str) -> Result<AuthoritativeRecord> {
        let now = self.clock.now_millis();
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .create(id, content, now)
            .await
    }
}

impl AuthoritativeStore for LibSqlRecordStore {
    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<AuthoritativeRecord>>> {
        Box::pin(async move {
            let db = self.db.lock().await;
            LibSqlRecordRepository::new(db.connection()).get(id).await
        })
    }

    fn save_versioned<'a>(
        &'a self,
        id: &'a str,
        content: &'a str,
        expected_version: Option<i64>,
    ) -> BoxFuture<'a, Result<VersionedSave>> {
        Box::pin(async move {
            let now = self.clock.now_millis();
            let db = self.db.lock().await;
            let record = LibSqlRecordRepository::new(db.connection())
                .update(id, content, expected_version, now)
                .await?;
            Ok(VersionedSave {
                new_version: record.version,
                record,
            })
        })
    }
}

/// How to settle a version conflict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Keep the local content and save it over the remote version
    Local,
    /// Drop the local content in favor of the remote record
    Remote,
    /// Present both sides to the user
    #[default]
    Manual,
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "manual" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!(
                "unknown merge strategy '{other}' (expected local, remote or manual)"
            ))),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Manual => "manual",
        })
    }
}

/// What the caller should do next after choosing a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MergeResolution {
    /// Save `content` again with `base_version` as the expected version
    Retry { content: String, base_version: i64 },
    /// Replace the working buffer with the remote content
    AcceptRemote { content: String, version: i64 },
    /// Nothing to do automatically; show both sides
    NeedsReview { local: String, remote: String },
}

/// Whole-document choice between the two sides of a conflict.
pub fn merge_changes(conflict: &ConflictData, strategy: MergeStrategy) -> MergeResolution {
    match strategy {
        MergeStrategy::Local => MergeResolution::Retry {
            content: conflict.local.clone(),
            base_version: conflict.remote_version,
        },
        MergeStrategy::Remote => MergeResolution::AcceptRemote {
            content: conflict.remote.clone(),
            version: conflict.remote_version,
        },
        MergeStrategy::Manual => MergeResolution::NeedsReview {
            local: conflict.local.clone(),
            remote: conflict.remote.clone(),
        },
    }
}

/// Reconciles local content with the authoritative store.
#[derive(Clone)]
pub struct PersistenceBridge {
    records: Arc<dyn AuthoritativeStore>,
    drafts: DraftStore,
    latency_budget: Duration,
}

impl PersistenceBridge {
    pub fn new(records: Arc<dyn AuthoritativeStore>, drafts: DraftStore) -> Self {
        let latency_budget = drafts.config().save_latency_budget();
        Self {
            records,
            drafts,
            latency_budget,
        }
    }

    pub fn records(&self) -> &Arc<dyn AuthoritativeStore> {
        &self.records
    }

    /// Commit `content` to the record `parent_id`.
    ///
    /// `local_version` is the record version the edit was based on; a live
    /// version above it is reported as a conflict without writing.
    pub async fn save_to_authoritative(
        &self,
        parent_id: &str,
        content: &str,
        local_version: Option<i64>,
    ) -> SaveResult {
        let started = Instant::now();
        let result = self.reconcile(parent_id, content, local_version).await;

        let elapsed = started.elapsed();
        if elapsed > self.latency_budget {
            tracing::warn!(
                "Saving {parent_id} took {}ms (budget {}ms)",
                elapsed.as_millis(),
                self.latency_budget.as_millis()
            );
        }
        result
    }

    async fn reconcile(
        &self,
        parent_id: &str,
        content: &str,
        local_version: Option<i64>,
    ) -> SaveResult {
        let record = match self.records.get_by_id(parent_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return self.not_found(parent_id),
            Err(error) => return self.failed(parent_id, &error),
        };

        if let Some(local_version) = local_version {
            if record.version > local_version {
                tracing::info!(
                    "Conflict saving {parent_id}: based on v{local_version}, record is at v{}",
                    record.version
                );
                return SaveResult::conflict(
                    ConflictData {
                        local: content.to_string(),
                        remote: record.content,
                        local_version,
                        remote_version: record.version,
                    },
                    self.drafts.now(),
                );
            }
        }

        match self
            .records
            .save_versioned(parent_id, content, Some(record.version))
            .await
        {
            Ok(saved) => {
                if let Err(error) = self.drafts.delete_all_for_parent(parent_id).await {
                    tracing::warn!("Saved {parent_id} but could not clear its drafts: {error}");
                }
                tracing::debug!("Committed {parent_id} at v{}", saved.new_version);
                SaveResult::committed(saved.record, self.drafts.now())
            }
            Err(Error::VersionMismatch { expected, actual }) => {
                tracing::info!(
                    "Record {parent_id} moved from v{expected} to v{actual} during save"
                );
                match self.records.get_by_id(parent_id).await {
                    Ok(Some(live)) => SaveResult::conflict(
                        ConflictData {
                            local: content.to_string(),
                            remote: live.content,
                            local_version: local_version.unwrap_or(expected),
                            remote_version: live.version,
                        },
                        self.drafts.now(),
                    ),
                    Ok(None) => self.not_found(parent_id),
                    Err(error) => self.failed(parent_id, &error),
                }
            }
            Err(error) => self.failed(parent_id, &error),
        }
    }

    fn not_found(&self, parent_id: &str) -> SaveResult {
        tracing::error!("Cannot save {parent_id}: record not found");
        SaveResult::failed(
            SaveFailure::new(
                SaveFailureKind::NotFound,
                format!("record '{parent_id}' not found"),
            ),
            self.drafts.now(),
        )
    }

    fn failed(&self, parent_id: &str, error: &Error) -> SaveResult {
        tracing::error!("Saving {parent_id} failed, keeping local drafts: {error}");
        SaveResult::failed(SaveFailure::from_error(error), self.drafts.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DraftConfig;
    use crate::db::Database;
    use crate::quota::{DraftUsageEstimator, QuotaGuard};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const START: i64 = 1_700_000_000_000;

    struct Fixture {
        bridge: PersistenceBridge,
        drafts: DraftStore,
        records: LibSqlRecordStore,
    }

    async fn setup() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(START));
        let db = Database::open_in_memory().await.unwrap().into_shared();
        let config = Arc::new(DraftConfig::default());
        let guard = QuotaGuard::new(
            Arc::new(DraftUsageEstimator::new(
                db.clone(),
                config.storage_quota_bytes,
            )),
            config.warning_threshold,
            config.hard_threshold,
        );
        let drafts = DraftStore::new(db.clone(), guard, config, clock.clone());
        let records = LibSqlRecordStore::new(db, clock);
        let bridge = PersistenceBridge::new(Arc::new(records.clone()), drafts.clone());
        Fixture {
            bridge,
            drafts,
            records,
        }
    }

    /// Bring `id` to `version` with `content` as the final text.
    async fn record_at(records: &LibSqlRecordStore, id: &str, version: i64, content: &str) {
        records.create_record(id, "initial").await.unwrap();
        for step in 2..=version {
            let text = if step == version { content } else { "intermediate" };
            records.save_versioned(id, text, None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn commit_bumps_version_and_clears_drafts() {
        let fixture = setup().await;
        record_at(&fixture.records, "song-1", 1, "initial").await;
        fixture.drafts.save("song-1", "[G]new", true).await.unwrap();

        let result = fixture
            .bridge
            .save_to_authoritative("song-1", "[G]new", Some(1))
            .await;

        assert!(result.success);
        let record = result.record.unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.content, "[G]new");
        assert!(fixture.drafts.get_latest("song-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn newer_remote_version_is_a_conflict_without_write() {
        let fixture = setup().await;
        record_at(&fixture.records, "song-1", 5, "remote-X").await;
        fixture.drafts.save("song-1", "mine", true).await.unwrap();

        let result = fixture
            .bridge
            .save_to_authoritative("song-1", "mine", Some(3))
            .await;

        assert!(!result.success);
        assert!(result.conflict_detected);
        assert_eq!(
            result.conflict_data,
            Some(ConflictData {
                local: "mine".to_string(),
                remote: "remote-X".to_string(),
                local_version: 3,
                remote_version: 5,
            })
        );

        let live = fixture.records.get_by_id("song-1").await.unwrap().unwrap();
        assert_eq!(live.version, 5);
        assert_eq!(live.content, "remote-X");
        assert!(fixture.drafts.get_latest("song-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn matching_or_missing_local_version_writes() {
        let fixture = setup().await;
        record_at(&fixture.records, "song-1", 3, "v3").await;

        let result = fixture
            .bridge
            .save_to_authoritative("song-1", "v4", Some(3))
            .await;
        assert_eq!(result.record.unwrap().version, 4);

        let result = fixture
            .bridge
            .save_to_authoritative("song-1", "v5", None)
            .await;
        assert_eq!(result.record.unwrap().version, 5);
    }

    #[tokio::test]
    async fn missing_record_is_terminal() {
        let fixture = setup().await;

        let result = fixture
            .bridge
            .save_to_authoritative("ghost", "text", Some(1))
            .await;

        assert!(!result.success);
        assert!(!result.conflict_detected);
        let failure = result.error.unwrap();
        assert_eq!(failure.kind, SaveFailureKind::NotFound);
        assert!(!failure.retryable);
    }

    /// Reads from a fixed record; writes fail or report a race.
    struct ScriptedStore {
        reads: Mutex<Vec<AuthoritativeRecord>>,
        write_error: fn() -> Error,
    }

    impl AuthoritativeStore for ScriptedStore {
        fn get_by_id<'a>(
            &'a self,
            _id: &'a str,
        ) -> BoxFuture<'a, Result<Option<AuthoritativeRecord>>> {
            Box::pin(async move {
                let mut reads = self.reads.lock().unwrap();
                let next = if reads.len() > 1 {
                    reads.remove(0)
                } else {
                    reads[0].clone()
                };
                Ok(Some(next))
            })
        }

        fn save_versioned<'a>(
            &'a self,
            _id: &'a str,
            _content: &'a str,
            _expected_version: Option<i64>,
        ) -> BoxFuture<'a, Result<VersionedSave>> {
            let error = (self.write_error)();
            Box::pin(async move { Err(error) })
        }
    }

    fn record(version: i64, content: &str) -> AuthoritativeRecord {
        AuthoritativeRecord {
            id: "song-1".to_string(),
            content: content.to_string(),
            version,
            updated_at: START,
        }
    }

    #[tokio::test]
    async fn store_failure_is_retryable_and_keeps_drafts() {
        let fixture = setup().await;
        fixture.drafts.save("song-1", "unsaved", true).await.unwrap();
        let store = ScriptedStore {
            reads: Mutex::new(vec![record(1, "old")]),
            write_error: || Error::Database("connection reset".to_string()),
        };
        let bridge = PersistenceBridge::new(Arc::new(store), fixture.drafts.clone());

        let result = bridge.save_to_authoritative("song-1", "unsaved", Some(1)).await;

        assert!(!result.success);
        let failure = result.error.unwrap();
        assert_eq!(failure.kind, SaveFailureKind::Store);
        assert!(failure.retryable);
        assert_eq!(
            fixture
                .drafts
                .get_latest("song-1")
                .await
                .unwrap()
                .unwrap()
                .content,
            "unsaved"
        );
    }

    #[tokio::test]
    async fn version_race_during_write_becomes_conflict() {
        let fixture = setup().await;
        let store = ScriptedStore {
            reads: Mutex::new(vec![record(2, "seen"), record(3, "raced in")]),
            write_error: || Error::VersionMismatch {
                expected: 2,
                actual: 3,
            },
        };
        let bridge = PersistenceBridge::new(Arc::new(store), fixture.drafts.clone());

        let result = bridge.save_to_authoritative("song-1", "mine", Some(2)).await;

        assert!(result.conflict_detected);
        let conflict = result.conflict_data.unwrap();
        assert_eq!(conflict.remote, "raced in");
        assert_eq!(conflict.local_version, 2);
        assert_eq!(conflict.remote_version, 3);
    }

    #[test]
    fn merge_strategies_choose_whole_documents() {
        let conflict = ConflictData {
            local: "mine".to_string(),
            remote: "theirs".to_string(),
            local_version: 3,
            remote_version: 5,
        };

        assert_eq!(
            merge_changes(&conflict, MergeStrategy::Local),
            MergeResolution::Retry {
                content: "mine".to_string(),
                base_version: 5,
            }
        );
        assert_eq!(
            merge_changes(&conflict, MergeStrategy::Remote),
            MergeResolution::AcceptRemote {
                content: "theirs".to_string(),
                version: 5,
            }
        );
        assert_eq!(
            merge_changes(&conflict, MergeStrategy::default()),
            MergeResolution::NeedsReview {
                local: "mine".to_string(),
                remote: "theirs".to_string(),
            }
        );
    }

    #[test]
    fn merge_strategy_parses_names() {
        assert_eq!("Local".parse::<MergeStrategy>().unwrap(), MergeStrategy::Local);
        assert_eq!(" remote ".parse::<MergeStrategy>().unwrap(), MergeStrategy::Remote);
        assert!("both".parse::<MergeStrategy>().is_err());
    }
}
