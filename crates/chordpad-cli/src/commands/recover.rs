use chordpad_core::{DraftPreview, TextPreview};
use serde::Serialize;

use crate::commands::common::{format_timestamp, normalize_chart_id, report_save_result, App};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct RecoveryReport<'a> {
    chart_id: &'a str,
    should_offer: bool,
    preview: &'a DraftPreview,
}

#[derive(Debug, Serialize)]
struct DiscardReport<'a> {
    chart_id: &'a str,
    discarded: u64,
}

pub async fn run_recover(
    app: &App,
    chart_id: &str,
    apply: bool,
    discard: bool,
    lines: Option<usize>,
    as_json: bool,
) -> Result<(), CliError> {
    let chart_id = normalize_chart_id(chart_id)?;
    let recovery = app.context.recovery();

    if discard {
        let discarded = recovery.discard_draft(&chart_id).await?;
        if as_json {
            let report = DiscardReport {
                chart_id: &chart_id,
                discarded,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Discarded {discarded} drafts for {chart_id}");
        }
        return Ok(());
    }

    let check = recovery.check_for_draft(&chart_id).await?;
    if !check.has_draft {
        return Err(CliError::NoDraft(chart_id));
    }

    if apply {
        if !check.should_offer {
            return Err(CliError::NothingToRecover(chart_id));
        }
        let content = recovery
            .apply_draft(&chart_id)
            .await?
            .ok_or_else(|| CliError::NoDraft(chart_id.clone()))?;
        let base_version = check.record.as_ref().map(|record| record.version);
        let result = app
            .context
            .bridge()
            .save_to_authoritative(&chart_id, &content, base_version)
            .await;
        return report_save_result(&chart_id, &result, as_json);
    }

    let preview = recovery
        .get_preview(&chart_id, lines)
        .await?
        .ok_or_else(|| CliError::NoDraft(chart_id.clone()))?;

    if as_json {
        let report = RecoveryReport {
            chart_id: &chart_id,
            should_offer: check.should_offer,
            preview: &preview,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Draft saved {}", format_timestamp(preview.draft_saved_at));
    print_text_preview(&preview.draft);
    println!();
    match (&preview.record, preview.record_updated_at) {
        (Some(record), Some(updated_at)) => {
            println!("Chart updated {}", format_timestamp(updated_at));
            print_text_preview(record);
        }
        _ => println!("Chart {chart_id} does not exist"),
    }
    println!();
    if check.should_offer {
        println!("The draft has unsaved changes. Use --apply to save it or --discard to drop it.");
    } else {
        println!("The chart already holds this content or is newer.");
    }
    Ok(())
}

fn print_text_preview(preview: &TextPreview) {
    for line in preview.text.lines() {
        println!("  {line}");
    }
    if preview.truncated {
        println!("  ({} lines total)", preview.total_lines);
    }
}
