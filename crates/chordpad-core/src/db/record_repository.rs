//! Versioned record repository implementation

use crate::error::{Error, Result};
use crate::models::AuthoritativeRecord;
use libsql::{params, Connection, Row};

/// Trait for versioned record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Create a record at version 1
    async fn create(&self, id: &str, content: &str, now: i64) -> Result<AuthoritativeRecord>;

    /// Get a record by ID
    async fn get(&self, id: &str) -> Result<Option<AuthoritativeRecord>>;

    /// Replace content and bump the version.
    ///
    /// With `expected_version`, the write only applies while the stored
    /// version still matches; otherwise `Error::VersionMismatch` is returned.
    async fn update(
        &self,
        id: &str,
        content: &str,
        expected_version: Option<i64>,
        now: i64,
    ) -> Result<AuthoritativeRecord>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &Row) -> Result<AuthoritativeRecord> {
        Ok(AuthoritativeRecord {
            id: row.get(0)?,
            content: row.get(1)?,
            version: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn create(&self, id: &str, content: &str, now: i64) -> Result<AuthoritativeRecord> {
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }

        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO records (id, content, version, updated_at) VALUES (?, ?, 1, ?)",
                params![id, content, now],
            )
            .await?;

        if inserted == 0 {
            return Err(Error::InvalidInput(format!("record '{id}' already exists")));
        }

        Ok(AuthoritativeRecord {
            id: id.to_string(),
            content: content.to_string(),
            version: 1,
            updated_at: now,
        })
    }

    async fn get(&self, id: &str) -> Result<Option<AuthoritativeRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content, version, updated_at FROM records WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        id: &str,
        content: &str,
        expected_version: Option<i64>,
        now: i64,
    ) -> Result<AuthoritativeRecord> {
        let rows = match expected_version {
            Some(expected) => {
                self.conn
                    .execute(
                        "UPDATE records SET content = ?, version = version + 1, updated_at = ?
                         WHERE id = ? AND version = ?",
                        params![content, now, id, expected],
                    )
                    .await?
            }
            None => {
                self.conn
                    .execute(
                        "UPDATE records SET content = ?, version = version + 1, updated_at = ?
                         WHERE id = ?",
                        params![content, now, id],
                    )
                    .await?
            }
        };

        let current = self.get(id).await?;
        match (rows, current, expected_version) {
            (0, None, _) => Err(Error::NotFound(id.to_string())),
            (0, Some(record), Some(expected)) => Err(Error::VersionMismatch {
                expected,
                actual: record.version,
            }),
            (_, Some(record), _) => Ok(record),
            (_, None, _) => Err(Error::Database(format!(
                "record '{id}' disappeared during update"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = repo.create("song-1", "[G]Amazing", 100).await.unwrap();
        assert_eq!(record.version, 1);

        let fetched = repo.get("song-1").await.unwrap().unwrap();
        assert_eq!(fetched, record);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.create("song-1", "a", 100).await.unwrap();
        let error = repo.create("song-1", "b", 200).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.create("song-1", "a", 100).await.unwrap();
        let updated = repo.update("song-1", "b", Some(1), 200).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.content, "b");
        assert_eq!(updated.updated_at, 200);

        let unconditional = repo.update("song-1", "c", None, 300).await.unwrap();
        assert_eq!(unconditional.version, 3);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_is_rejected() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.create("song-1", "a", 100).await.unwrap();
        repo.update("song-1", "b", Some(1), 200).await.unwrap();

        let error = repo.update("song-1", "c", Some(1), 300).await.unwrap_err();
        assert!(matches!(
            error,
            Error::VersionMismatch {
                expected: 1,
                actual: 2
            }
        ));
        assert_eq!(repo.get("song-1").await.unwrap().unwrap().content, "b");
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let error = repo.update("nope", "c", None, 300).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }
}
