use chordpad_core::AuthoritativeStore;

use crate::cli::RecordCommands;
use crate::commands::common::{
    format_timestamp, normalize_chart_id, resolve_chart_content, App,
};
use crate::error::CliError;

pub async fn run_record(app: &App, command: RecordCommands) -> Result<(), CliError> {
    match command {
        RecordCommands::Create { chart_id, content } => {
            let chart_id = normalize_chart_id(&chart_id)?;
            let content = resolve_chart_content(&content)?;
            let record = app.records.create_record(&chart_id, &content).await?;
            println!("{} v{}", record.id, record.version);
        }
        RecordCommands::Show { chart_id, json } => {
            let chart_id = normalize_chart_id(&chart_id)?;
            let record = app
                .records
                .get_by_id(&chart_id)
                .await?
                .ok_or_else(|| CliError::ChartNotFound(chart_id.clone()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!(
                    "{} v{}  updated {}",
                    record.id,
                    record.version,
                    format_timestamp(record.updated_at)
                );
                println!();
                println!("{}", record.content);
            }
        }
    }
    Ok(())
}
