use crate::commands::common::{
    draft_to_list_item, normalize_chart_id, resolve_chart_content, App,
};
use crate::error::CliError;

pub async fn run_checkpoint(
    app: &App,
    chart_id: &str,
    content_parts: &[String],
    manual: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let chart_id = normalize_chart_id(chart_id)?;
    let content = resolve_chart_content(content_parts)?;

    let Some(draft) = app.context.drafts().save(&chart_id, &content, !manual).await? else {
        eprintln!("Draft storage is not ready; nothing was written");
        return Ok(());
    };

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&draft_to_list_item(&draft))?
        );
    } else {
        println!("{}", draft.id);
    }
    Ok(())
}
