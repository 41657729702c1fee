use crate::commands::common::{
    normalize_chart_id, report_save_result, resolve_chart_content, App,
};
use crate::error::CliError;

/// Checkpoint the content locally, then commit it to the chart.
pub async fn run_save(
    app: &App,
    chart_id: &str,
    content_parts: &[String],
    base_version: Option<i64>,
    as_json: bool,
) -> Result<(), CliError> {
    let chart_id = normalize_chart_id(chart_id)?;
    let content = resolve_chart_content(content_parts)?;

    // A failed commit must not lose the content.
    if let Err(error) = app.context.drafts().save(&chart_id, &content, false).await {
        tracing::warn!("Could not checkpoint {chart_id} before saving: {error}");
    }

    let result = app
        .context
        .bridge()
        .save_to_authoritative(&chart_id, &content, base_version)
        .await;
    report_save_result(&chart_id, &result, as_json)
}
