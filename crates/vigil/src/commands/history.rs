//! Verdict history listing.

use anyhow::Result;
use colored::Colorize;
use vigil_core::{Verdict, VerdictStatus};

use super::{paint_status, truncate};
use crate::api::{ApiClient, HistoryQuery};
use crate::cli::HistoryArgs;

pub async fn execute(args: HistoryArgs, api: &ApiClient) -> Result<()> {
    // Reject typos before the round trip
    let status = args
        .status
        .as_deref()
        .map(|s| s.parse::<VerdictStatus>())
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let query = HistoryQuery {
        session_id: args.session_id,
        status: status.map(|s| s.as_str().to_string()),
        min_threat_level: args.min_threat,
        limit: Some(args.limit),
    };
    let history = api.history(&query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&history.verdicts)?);
        return Ok(());
    }

    if history.verdicts.is_empty() {
        println!("No verdicts recorded");
        return Ok(());
    }

    println!(
        "{} (showing {} of {})",
        "Verdict history".cyan().bold(),
        history.count,
        history.total
    );
    println!("{}", "─".repeat(78));
    for verdict in &history.verdicts {
        println!("{}", format_row(verdict));
    }
    Ok(())
}

/// One history line: time, status, threat, confidence, summary.
fn format_row(verdict: &Verdict) -> String {
    let mut markers = String::new();
    if verdict.image_path.is_some() {
        markers.push('📷');
    }
    if verdict.video_path.is_some() {
        markers.push('🎥');
    }

    format!(
        "{}  {:<8} {:>2}/10 {:>3.0}%  {} {}",
        verdict.timestamp.format("%m-%d %H:%M:%S"),
        paint_status(verdict.status),
        verdict.threat_level,
        verdict.confidence_percent(),
        truncate(&verdict.summary, 44),
        markers
    )
    .trim_end()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vigil_core::MonitoringType;

    #[test]
    fn test_format_row() {
        colored::control::set_override(false);
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let mut verdict = Verdict::unavailable("s1", MonitoringType::Security, "unused", ts);
        verdict.status = VerdictStatus::Danger;
        verdict.threat_level = 8;
        verdict.confidence = 0.92;
        verdict.summary = "Person at the back door".to_string();
        verdict.video_path = Some("clip.mjpeg".to_string());

        let row = format_row(&verdict);
        assert!(row.starts_with("03-14 09:26:53  DANGER"));
        assert!(row.contains(" 8/10  92%"));
        assert!(row.contains("Person at the back door"));
        assert!(row.ends_with('🎥'));
    }

    #[test]
    fn test_format_row_without_media() {
        colored::control::set_override(false);
        let verdict = Verdict::unavailable(
            "s1",
            MonitoringType::Presence,
            "capture unavailable",
            Utc::now(),
        );

        let row = format_row(&verdict);
        assert!(row.contains("UNKNOWN"));
        assert!(row.ends_with("capture unavailable"));
    }
}
