//! Retention pass on demand.

use anyhow::Result;
use colored::Colorize;

use crate::api::ApiClient;

pub async fn execute(
    max_records: Option<u64>,
    max_age_days: Option<u32>,
    api: &ApiClient,
) -> Result<()> {
    let report = api.prune(max_records, max_age_days).await?;

    if report.removed == 0 {
        println!("{} Nothing to prune", "•".yellow());
    } else {
        println!(
            "{} Removed {} record(s) and {} media file(s)",
            "✓".green(),
            report.removed,
            report.media_paths.len()
        );
    }
    Ok(())
}
