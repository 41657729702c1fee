use chordpad_core::models::SweepReport;

use crate::commands::common::{format_timestamp, App};
use crate::error::CliError;

pub async fn run_stats(app: &App, as_json: bool) -> Result<(), CliError> {
    let stats = app.context.drafts().stats().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    {
        let db = app.db.lock().await;
        if let Some(path) = db.path() {
            println!("Database: {}", path.display());
        }
    }

    let quota = app.context.config().storage_quota_bytes;
    println!(
        "Drafts:   {} ({} auto, {} manual)",
        stats.total_drafts, stats.auto_save_drafts, stats.manual_drafts
    );
    println!("Expired:  {}", stats.expired_drafts);
    println!(
        "Size:     {} of {} bytes ({:.1}%)",
        stats.total_size,
        quota,
        usage_percentage(stats.total_size, quota)
    );
    if let (Some(oldest), Some(newest)) = (stats.oldest_draft, stats.newest_draft) {
        println!("Oldest:   {}", format_timestamp(oldest));
        println!("Newest:   {}", format_timestamp(newest));
    }
    Ok(())
}

pub async fn run_purge(
    app: &App,
    expired_only: bool,
    target: Option<u64>,
    as_json: bool,
) -> Result<(), CliError> {
    let drafts = app.context.drafts();
    let expired = drafts.purge_expired().await?;
    let evicted = if expired_only {
        0
    } else {
        let target = target.unwrap_or(app.context.config().global_lru_target);
        drafts.purge_by_lru(target).await?
    };
    let report = SweepReport { expired, evicted };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Removed {} expired and {} least recently used drafts",
            report.expired, report.evicted
        );
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
pub fn usage_percentage(used: u64, quota: u64) -> f64 {
    if quota == 0 {
        return 100.0;
    }
    used as f64 / quota as f64 * 100.0
}
