//! Settings repository implementation

use crate::config::DraftConfig;
use crate::error::Result;
use libsql::Connection;

/// Trait for persisted configuration overrides (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Apply stored overrides on top of `base`
    async fn load(&self, base: DraftConfig) -> Result<DraftConfig>;

    /// Store every key of `config`
    async fn save(&self, config: &DraftConfig) -> Result<()>;

    /// Store a single override after checking it parses
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove all stored overrides
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn load(&self, base: DraftConfig) -> Result<DraftConfig> {
        let mut config = base;

        for key in DraftConfig::KEYS {
            let Some(value) = self.get_setting(key).await? else {
                continue;
            };
            if let Err(error) = config.apply_override(key, &value) {
                tracing::warn!("Ignoring stored setting {key}={value}: {error}");
            }
        }

        if let Err(error) = config.validate() {
            tracing::warn!("Stored settings are inconsistent ({error}); using defaults");
            return Ok(DraftConfig::default());
        }
        Ok(config)
    }

    async fn save(&self, config: &DraftConfig) -> Result<()> {
        config.validate()?;
        for (key, value) in config.entries() {
            self.set_setting(key, &value).await?;
        }
        Ok(())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        DraftConfig::default().apply_override(key, value)?;
        self.set_setting(key, value.trim()).await
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM settings", ()).await?;
        Ok(())
    }
}

impl LibSqlSettingsRepository<'_> {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}
