//! Draft repository implementation

use crate::error::Result;
use crate::models::{Draft, DraftStats};
use crate::util::{count_to_u64, u64_to_i64};
use libsql::{params, Connection, Row, Value};

const DRAFT_COLUMNS: &str =
    "id, parent_id, content, saved_at, expires_at, last_accessed_at, is_auto_save, version";

/// Trait for draft storage operations (async)
///
/// Repositories only run SQL; retention and quota policy live in
/// [`crate::drafts::DraftStore`].
#[allow(async_fn_in_trait)]
pub trait DraftRepository {
    /// Insert a new draft with its estimated size
    async fn insert(&self, draft: &Draft, size_bytes: u64) -> Result<()>;

    /// Non-expired drafts for a parent, newest first
    async fn list_live_for_parent(&self, parent_id: &str, now: i64) -> Result<Vec<Draft>>;

    /// Stamp `last_accessed_at` on every non-expired draft for a parent
    async fn touch_live_for_parent(&self, parent_id: &str, now: i64) -> Result<u64>;

    /// Number of stored drafts for a parent, expired ones included
    async fn count_for_parent(&self, parent_id: &str) -> Result<u64>;

    /// Delete the `count` oldest drafts of a parent
    async fn delete_oldest_for_parent(&self, parent_id: &str, count: u64) -> Result<u64>;

    /// Delete every draft of a parent
    async fn delete_for_parent(&self, parent_id: &str) -> Result<u64>;

    /// Delete drafts whose expiry has been reached
    async fn delete_expired(&self, now: i64) -> Result<u64>;

    /// Total number of stored drafts
    async fn count(&self) -> Result<u64>;

    /// Delete the `count` least recently accessed drafts across all parents
    async fn delete_least_recently_accessed(&self, count: u64) -> Result<u64>;

    /// Sum of the estimated sizes of all drafts
    async fn total_size(&self) -> Result<u64>;

    /// Aggregate counts for diagnostics
    async fn stats(&self, now: i64) -> Result<DraftStats>;
}

/// libSQL implementation of `DraftRepository`
pub struct LibSqlDraftRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlDraftRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a draft from a database row
    fn parse_draft(row: &Row) -> Result<Draft> {
        Ok(Draft {
            id: row.get::<String>(0)?.into(),
            parent_id: row.get(1)?,
            content: row.get(2)?,
            saved_at: row.get(3)?,
            expires_at: row.get(4)?,
            last_accessed_at: row.get(5)?,
            is_auto_save: row.get::<i32>(6)? != 0,
            version: row.get(7)?,
        })
    }

    async fn query_count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self.conn.query(sql, params).await?;
        let count: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };
        Ok(count_to_u64(count))
    }
}

fn optional_integer(value: Value) -> Option<i64> {
    match value {
        Value::Integer(value) => Some(value),
        _ => None,
    }
}

impl DraftRepository for LibSqlDraftRepository<'_> {
    async fn insert(&self, draft: &Draft, size_bytes: u64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO drafts (id, parent_id, content, saved_at, expires_at, last_accessed_at, is_auto_save, version, size_bytes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    draft.id.as_str(),
                    draft.parent_id.as_str(),
                    draft.content.as_str(),
                    draft.saved_at,
                    draft.expires_at,
                    draft.last_accessed_at,
                    i32::from(draft.is_auto_save),
                    draft.version,
                    u64_to_i64(size_bytes)
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_live_for_parent(&self, parent_id: &str, now: i64) -> Result<Vec<Draft>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {DRAFT_COLUMNS}
                     FROM drafts
                     WHERE parent_id = ? AND expires_at > ?
                     ORDER BY saved_at DESC, rowid DESC"
                ),
                params![parent_id, now],
            )
            .await?;

        let mut drafts = Vec::new();
        while let Some(row) = rows.next().await? {
            drafts.push(Self::parse_draft(&row)?);
        }
        Ok(drafts)
    }

    async fn touch_live_for_parent(&self, parent_id: &str, now: i64) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE drafts SET last_accessed_at = ?1 WHERE parent_id = ?2 AND expires_at > ?1",
                params![now, parent_id],
            )
            .await?;
        Ok(rows)
    }

    async fn count_for_parent(&self, parent_id: &str) -> Result<u64> {
        self.query_count(
            "SELECT COUNT(*) FROM drafts WHERE parent_id = ?",
            params![parent_id],
        )
        .await
    }

    async fn delete_oldest_for_parent(&self, parent_id: &str, count: u64) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }
        let rows = self
            .conn
            .execute(
                "DELETE FROM drafts WHERE id IN (
                    SELECT id FROM drafts
                    WHERE parent_id = ?
                    ORDER BY saved_at ASC, rowid ASC
                    LIMIT ?
                 )",
                params![parent_id, u64_to_i64(count)],
            )
            .await?;
        Ok(rows)
    }

    async fn delete_for_parent(&self, parent_id: &str) -> Result<u64> {
        let rows = self
            .conn
            .execute("DELETE FROM drafts WHERE parent_id = ?", params![parent_id])
            .await?;
        Ok(rows)
    }

    async fn delete_expired(&self, now: i64) -> Result<u64> {
        let rows = self
            .conn
            .execute("DELETE FROM drafts WHERE expires_at <= ?", params![now])
            .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<u64> {
        self.query_count("SELECT COUNT(*) FROM drafts", ()).await
    }

    async fn delete_least_recently_accessed(&self, count: u64) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }
        let rows = self
            .conn
            .execute(
                "DELETE FROM drafts WHERE id IN (
                    SELECT id FROM drafts
                    ORDER BY last_accessed_at ASC, saved_at ASC, rowid ASC
                    LIMIT ?
                 )",
                params![u64_to_i64(count)],
            )
            .await?;
        Ok(rows)
    }

    async fn total_size(&self) -> Result<u64> {
        self.query_count("SELECT COALESCE(SUM(size_bytes), 0) FROM drafts", ())
            .await
    }

    async fn stats(&self, now: i64) -> Result<DraftStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(is_auto_save), 0),
                        COALESCE(SUM(size_bytes), 0),
                        MIN(saved_at),
                        MAX(saved_at)
                 FROM drafts",
                params![now],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(DraftStats::default());
        };

        let total_drafts = count_to_u64(row.get(0)?);
        let auto_save_drafts = count_to_u64(row.get(2)?);
        Ok(DraftStats {
            total_drafts,
            expired_drafts: count_to_u64(row.get(1)?),
            auto_save_drafts,
            manual_drafts: total_drafts.saturating_sub(auto_save_drafts),
            total_size: count_to_u64(row.get(3)?),
            oldest_draft: optional_integer(row.get_value(4)?),
            newest_draft: optional_integer(row.get_value(5)?),
        })
    }
}
