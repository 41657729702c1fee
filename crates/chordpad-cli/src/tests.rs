use std::path::PathBuf;

use chordpad_core::Draft;
use clap::CommandFactory;
use pretty_assertions::assert_eq;

use crate::cli::{Cli, CompletionShell};
use crate::commands::common::{
    chart_preview, default_db_path, default_editor, format_draft_lines, format_relative_time,
    format_timestamp, load_config, normalize_chart_id, normalize_content, report_save_result,
    resolve_db_path, App,
};
use crate::commands::completions::render_completions;
use crate::commands::config::store_setting;
use crate::commands::maintenance::usage_percentage;
use crate::error::CliError;

const NOW: i64 = 1_700_000_000_000;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn normalize_content_keeps_chord_indentation() {
    assert_eq!(
        normalize_content("      G        C\nAmazing grace\n\n"),
        Some("      G        C\nAmazing grace".to_string())
    );
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_chart_id_trims_and_rejects_empty() {
    assert_eq!(normalize_chart_id("  song-1 ").unwrap(), "song-1");
    assert!(matches!(
        normalize_chart_id("   "),
        Err(CliError::EmptyChartId)
    ));
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn explicit_db_path_wins() {
    let explicit = PathBuf::from("/tmp/explicit.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
    assert!(default_db_path().ends_with("chordpad/chordpad.db"));
}

#[test]
fn chart_preview_uses_first_non_blank_line() {
    assert_eq!(
        chart_preview("\n   \n  G    D   Em\nline two", 40),
        "G D Em"
    );
    assert_eq!(chart_preview("abcdefghijkl", 8), "abcde...");
    assert_eq!(chart_preview("", 8), "");
}

#[test]
fn relative_time_buckets() {
    assert_eq!(format_relative_time(NOW - 5_000, NOW), "just now");
    assert_eq!(format_relative_time(NOW - 5 * 60_000, NOW), "5m ago");
    assert_eq!(format_relative_time(NOW - 3 * 3_600_000, NOW), "3h ago");
    assert_eq!(format_relative_time(NOW - 2 * 86_400_000, NOW), "2d ago");
    assert_eq!(format_relative_time(NOW - 14 * 86_400_000, NOW), "2w ago");
    assert_eq!(format_relative_time(NOW + 60_000, NOW), "just now");
}

#[test]
fn timestamps_render_in_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn draft_lines_mark_kind_and_id() {
    let draft = Draft::new("song-1", "[G]Amazing grace", false, NOW, 60_000);
    let lines = format_draft_lines(std::slice::from_ref(&draft));

    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("manual"));
    assert!(lines[0].contains("[G]Amazing grace"));
    assert!(lines[0].ends_with(draft.id.as_str()));
}

#[test]
fn usage_percentage_handles_zero_quota() {
    assert!((usage_percentage(50, 200) - 25.0).abs() < f64::EPSILON);
    assert!((usage_percentage(1, 0) - 100.0).abs() < f64::EPSILON);
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("chordpad"));
    assert!(script.contains("checkpoint"));
}

#[test]
fn conflicts_and_failures_become_errors() {
    use chordpad_core::{ConflictData, SaveFailure, SaveFailureKind, SaveResult};

    let conflict = SaveResult::conflict(
        ConflictData {
            local: "mine".into(),
            remote: "theirs".into(),
            local_version: 3,
            remote_version: 5,
        },
        NOW,
    );
    assert!(matches!(
        report_save_result("song-1", &conflict, false),
        Err(CliError::Conflict {
            local_version: 3,
            remote_version: 5
        })
    ));

    let failed = SaveResult::failed(
        SaveFailure::new(SaveFailureKind::NotFound, "record song-1 not found"),
        NOW,
    );
    let Err(CliError::SaveFailed(message)) = report_save_result("song-1", &failed, false) else {
        panic!("expected a save failure");
    };
    assert!(message.contains("not found"));

    assert!(report_save_result("song-1", &SaveResult::unchanged(NOW), false).is_ok());
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn app_opens_nested_path_and_commits() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("chordpad.db");

    let app = App::open(&db_path, None).await.unwrap();
    assert!(db_path.exists());

    app.records.create_record("song-1", "verse").await.unwrap();
    app.context
        .drafts()
        .save("song-1", "verse two", false)
        .await
        .unwrap();

    let result = app
        .context
        .bridge()
        .save_to_authoritative("song-1", "verse two", Some(1))
        .await;
    assert!(result.success);
    assert_eq!(result.record.unwrap().version, 2);
    assert!(app
        .context
        .drafts()
        .list_for_parent("song-1")
        .await
        .unwrap()
        .is_empty());

    app.close().await;
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn config_file_and_stored_overrides_layer() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("drafts.json");
    std::fs::write(&config_path, r#"{ "debounce_ms": 250, "preview_lines": 4 }"#).unwrap();

    let app = App::open(&dir.path().join("chordpad.db"), Some(&config_path))
        .await
        .unwrap();
    assert_eq!(app.context.config().debounce_ms, 250);

    let updated = store_setting(&app.db, Some(&config_path), "preview_lines", "6")
        .await
        .unwrap();
    assert_eq!(updated.preview_lines, 6);

    let loaded = load_config(&app.db, Some(&config_path)).await.unwrap();
    assert_eq!(loaded.debounce_ms, 250);
    assert_eq!(loaded.preview_lines, 6);

    let rejected = store_setting(&app.db, Some(&config_path), "hard_threshold", "0.5").await;
    assert!(matches!(rejected, Err(CliError::Config(_))));
    assert!(store_setting(&app.db, None, "theme", "dark").await.is_err());

    app.close().await;
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn malformed_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("drafts.json");
    std::fs::write(&config_path, r#"{ "debounce": 250 }"#).unwrap();

    let result = App::open(&dir.path().join("chordpad.db"), Some(&config_path)).await;
    assert!(matches!(result, Err(CliError::Config(_))));
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn recover_apply_refuses_draft_older_than_chart() {
    use chordpad_core::AuthoritativeStore;

    use crate::commands::recover::run_recover;

    let dir = tempfile::tempdir().unwrap();
    let app = App::open(&dir.path().join("chordpad.db"), None)
        .await
        .unwrap();

    app.context
        .drafts()
        .save("song-1", "stale draft", true)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    app.records
        .create_record("song-1", "fresh remote")
        .await
        .unwrap();

    let result = run_recover(&app, "song-1", true, false, None, false).await;
    assert!(matches!(result, Err(CliError::NothingToRecover(_))));

    let record = app.records.get_by_id("song-1").await.unwrap().unwrap();
    assert_eq!(record.content, "fresh remote");
    assert_eq!(record.version, 1);
    assert_eq!(
        app.context
            .drafts()
            .list_for_parent("song-1")
            .await
            .unwrap()
            .len(),
        1
    );

    app.close().await;
}
