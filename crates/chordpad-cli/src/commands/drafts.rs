use crate::commands::common::{
    draft_to_list_item, format_draft_lines, normalize_chart_id, App,
};
use crate::error::CliError;

pub async fn run_list(app: &App, chart_id: &str, as_json: bool) -> Result<(), CliError> {
    let chart_id = normalize_chart_id(chart_id)?;
    let drafts = app.context.drafts().list_for_parent(&chart_id).await?;

    if as_json {
        let items = drafts.iter().map(draft_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if drafts.is_empty() {
        println!("No drafts for {chart_id}");
        return Ok(());
    }

    for line in format_draft_lines(&drafts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_latest(app: &App, chart_id: &str, as_json: bool) -> Result<(), CliError> {
    let chart_id = normalize_chart_id(chart_id)?;
    let draft = app
        .context
        .drafts()
        .get_latest(&chart_id)
        .await?
        .ok_or_else(|| CliError::NoDraft(chart_id.clone()))?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&draft_to_list_item(&draft))?
        );
    } else {
        println!("{}", draft.content);
    }
    Ok(())
}
