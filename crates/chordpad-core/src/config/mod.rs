//! Draft persistence configuration.
//!
//! `DraftConfig` gathers every tunable used by the quota guard, the draft
//! store, the autosave scheduler and the persistence bridge. Values can be
//! loaded from JSON (missing keys fall back to defaults) and overridden one
//! key at a time from the `settings` table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Tunables for draft persistence and autosave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DraftConfig {
    /// Quiet period after the last edit before an autosave fires
    pub debounce_ms: u64,
    /// Upper bound on how long dirty content may go without a checkpoint
    pub idle_save_ms: u64,
    /// Maximum drafts kept per parent record
    pub max_drafts_per_entity: u64,
    /// Maximum drafts kept across all parents
    pub global_lru_target: u64,
    /// How long a draft stays recoverable after it was written
    pub retention_window_ms: u64,
    /// Byte budget for local draft storage
    pub storage_quota_bytes: u64,
    /// Usage fraction at which writes log a warning
    pub warning_threshold: f64,
    /// Usage fraction above which writes are refused
    pub hard_threshold: f64,
    /// Save latency above this is logged
    pub save_latency_budget_ms: u64,
    /// Lines shown per side in a recovery preview
    pub preview_lines: usize,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            idle_save_ms: 5_000,
            max_drafts_per_entity: 5,
            global_lru_target: 50,
            retention_window_ms: 7 * DAY_MS,
            storage_quota_bytes: 5 * 1024 * 1024,
            warning_threshold: 0.80,
            hard_threshold: 0.95,
            save_latency_budget_ms: 1_000,
            preview_lines: 10,
        }
    }
}

impl DraftConfig {
    /// Setting keys accepted by [`DraftConfig::apply_override`].
    pub const KEYS: [&'static str; 10] = [
        "debounce_ms",
        "idle_save_ms",
        "max_drafts_per_entity",
        "global_lru_target",
        "retention_window_ms",
        "storage_quota_bytes",
        "warning_threshold",
        "hard_threshold",
        "save_latency_budget_ms",
        "preview_lines",
    ];

    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the store or scheduler misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(Error::InvalidInput("debounce_ms must be positive".into()));
        }
        if self.idle_save_ms == 0 {
            return Err(Error::InvalidInput("idle_save_ms must be positive".into()));
        }
        if self.max_drafts_per_entity == 0 {
            return Err(Error::InvalidInput(
                "max_drafts_per_entity must be at least 1".into(),
            ));
        }
        if self.retention_window_ms == 0 {
            return Err(Error::InvalidInput(
                "retention_window_ms must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.warning_threshold)
            || !(0.0..=1.0).contains(&self.hard_threshold)
        {
            return Err(Error::InvalidInput(
                "thresholds must be fractions between 0 and 1".into(),
            ));
        }
        if self.warning_threshold > self.hard_threshold {
            return Err(Error::InvalidInput(
                "warning_threshold must not exceed hard_threshold".into(),
            ));
        }
        Ok(())
    }

    /// Set a single key from its string form.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        let value = normalize_text_option(Some(value.to_string()))
            .ok_or_else(|| Error::InvalidInput(format!("value for '{key}' is empty")))?;

        match key {
            "debounce_ms" => self.debounce_ms = parse_value(key, &value)?,
            "idle_save_ms" => self.idle_save_ms = parse_value(key, &value)?,
            "max_drafts_per_entity" => self.max_drafts_per_entity = parse_value(key, &value)?,
            "global_lru_target" => self.global_lru_target = parse_value(key, &value)?,
            "retention_window_ms" => self.retention_window_ms = parse_value(key, &value)?,
            "storage_quota_bytes" => self.storage_quota_bytes = parse_value(key, &value)?,
            "warning_threshold" => self.warning_threshold = parse_value(key, &value)?,
            "hard_threshold" => self.hard_threshold = parse_value(key, &value)?,
            "save_latency_budget_ms" => self.save_latency_budget_ms = parse_value(key, &value)?,
            "preview_lines" => self.preview_lines = parse_value(key, &value)?,
            _ => return Err(Error::InvalidInput(format!("unknown setting '{key}'"))),
        }
        Ok(())
    }

    /// Every key with its current value, in [`DraftConfig::KEYS`] order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("debounce_ms", self.debounce_ms.to_string()),
            ("idle_save_ms", self.idle_save_ms.to_string()),
            (
                "max_drafts_per_entity",
                self.max_drafts_per_entity.to_string(),
            ),
            ("global_lru_target", self.global_lru_target.to_string()),
            ("retention_window_ms", self.retention_window_ms.to_string()),
            ("storage_quota_bytes", self.storage_quota_bytes.to_string()),
            ("warning_threshold", self.warning_threshold.to_string()),
            ("hard_threshold", self.hard_threshold.to_string()),
            (
                "save_latency_budget_ms",
                self.save_latency_budget_ms.to_string(),
            ),
            ("preview_lines", self.preview_lines.to_string()),
        ]
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_save_ms)
    }

    pub const fn save_latency_budget(&self) -> Duration {
        Duration::from_millis(self.save_latency_budget_ms)
    }

    /// Retention window as signed milliseconds for timestamp arithmetic.
    pub fn retention_window_millis(&self) -> i64 {
        i64::try_from(self.retention_window_ms).unwrap_or(i64::MAX)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid value '{value}' for '{key}'")))
}
