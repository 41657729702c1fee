use chordpad_core::AuthoritativeStore;

use crate::commands::common::{
    capture_editor_input_with_initial, format_timestamp, normalize_chart_id, report_save_result,
    App,
};
use crate::error::CliError;

/// Open the chart in `$EDITOR`, preferring a newer unsaved draft, then save.
pub async fn run_edit(app: &App, chart_id: &str) -> Result<(), CliError> {
    let chart_id = normalize_chart_id(chart_id)?;
    if app.records.get_by_id(&chart_id).await?.is_none() {
        return Err(CliError::ChartNotFound(chart_id));
    }

    let session = app.context.open_editor(&chart_id).await?;
    let outcome = edit_in_session(&session).await;
    session.close();
    let result = outcome?;

    report_save_result(&chart_id, &result, false)
}

async fn edit_in_session(
    session: &chordpad_core::EditorSession,
) -> Result<chordpad_core::SaveResult, CliError> {
    let check = session.check_for_draft().await?;
    let initial = match (&check.draft, &check.record) {
        (Some(draft), _) if check.should_offer => {
            eprintln!(
                "Restoring unsaved draft from {}",
                format_timestamp(draft.saved_at)
            );
            draft.content.clone()
        }
        (_, Some(record)) => record.content.clone(),
        _ => String::new(),
    };

    let edited = capture_editor_input_with_initial(&initial)?.ok_or(CliError::EmptyContent)?;
    session.content_changed(edited)?;
    Ok(session.force_save().await?)
}
