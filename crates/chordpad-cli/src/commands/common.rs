use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chordpad_core::db::{Database, LibSqlSettingsRepository, SettingsRepository, SharedDatabase};
use chordpad_core::{
    Clock, Draft, DraftConfig, DraftContext, LibSqlRecordStore, SaveResult, SystemClock,
};
use chrono::Utc;
use serde::Serialize;

use crate::error::CliError;

/// Database, chart store and draft context opened for one command.
pub struct App {
    pub db: SharedDatabase,
    pub records: LibSqlRecordStore,
    pub context: DraftContext,
}

impl App {
    pub async fn open(db_path: &Path, config_path: Option<&Path>) -> Result<Self, CliError> {
        let db = open_database(db_path).await?;
        let config = load_config(&db, config_path).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let records = LibSqlRecordStore::new(db.clone(), clock);
        let context = DraftContext::open(db.clone(), Arc::new(records.clone()), config).await?;

        Ok(Self {
            db,
            records,
            context,
        })
    }

    pub async fn close(self) {
        self.context.close().await;
    }
}

#[derive(Debug, Serialize)]
pub struct DraftListItem {
    pub id: String,
    pub preview: String,
    pub content: String,
    pub saved_at: i64,
    pub saved_at_iso: String,
    pub expires_at: i64,
    pub relative_time: String,
    pub is_auto_save: bool,
}

pub fn draft_to_list_item(draft: &Draft) -> DraftListItem {
    let now_ms = Utc::now().timestamp_millis();
    DraftListItem {
        id: draft.id.to_string(),
        preview: chart_preview(&draft.content, 80),
        content: draft.content.clone(),
        saved_at: draft.saved_at,
        saved_at_iso: format_timestamp(draft.saved_at),
        expires_at: draft.expires_at,
        relative_time: format_relative_time(draft.saved_at, now_ms),
        is_auto_save: draft.is_auto_save,
    }
}

pub fn format_draft_lines(drafts: &[Draft]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    drafts
        .iter()
        .map(|draft| {
            let kind = if draft.is_auto_save { "auto" } else { "manual" };
            let preview = chart_preview(&draft.content, 40);
            let relative_time = format_relative_time(draft.saved_at, now_ms);
            let id = &draft.id;
            format!("{kind:<6}  {preview:<40}  {relative_time:<10}  {id}")
        })
        .collect()
}

/// First non-blank line of a chart, whitespace collapsed.
pub fn chart_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Print a save outcome; anything but a commit or a no-op is an error.
pub fn report_save_result(
    chart_id: &str,
    result: &SaveResult,
    as_json: bool,
) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(result)?);
    }

    if let Some(conflict) = &result.conflict_data {
        return Err(CliError::Conflict {
            local_version: conflict.local_version,
            remote_version: conflict.remote_version,
        });
    }
    if !result.success {
        let message = result.error_message().unwrap_or("unknown error").to_string();
        return Err(CliError::SaveFailed(message));
    }

    if !as_json {
        match &result.record {
            Some(record) => println!("{} v{}", record.id, record.version),
            None if result.unchanged => println!("{chart_id} unchanged"),
            None => println!("{chart_id} checkpointed"),
        }
    }
    Ok(())
}

pub fn resolve_chart_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

/// Trailing whitespace is dropped; leading indentation aligns chords and is kept.
pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim_end();
    if trimmed.trim_start().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_chart_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyChartId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_chart_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let chart_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&chart_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        ))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // EDITOR may carry arguments, e.g. "code --wait".
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_chart_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("chordpad-chart-{}-{now}.chord", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("CHORDPAD_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chordpad")
        .join("chordpad.db")
}

pub async fn open_database(path: &Path) -> Result<SharedDatabase, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path).await?.into_shared())
}

/// Defaults, then the optional JSON file, then overrides stored in the database.
pub async fn load_config(
    db: &SharedDatabase,
    config_path: Option<&Path>,
) -> Result<DraftConfig, CliError> {
    let base = match config_path {
        Some(path) => {
            let payload = std::fs::read_to_string(path)?;
            DraftConfig::from_json_str(&payload)
                .map_err(|error| CliError::Config(format!("{}: {error}", path.display())))?
        }
        None => DraftConfig::default(),
    };

    let db = db.lock().await;
    Ok(LibSqlSettingsRepository::new(db.connection())
        .load(base)
        .await?)
}
