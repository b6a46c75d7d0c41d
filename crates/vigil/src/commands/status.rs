//! Engine status dashboard.
//!
//! Supports JSON output for programmatic use.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use vigil_core::{EngineState, SessionSnapshot};

use super::{paint_state, paint_status, truncate};
use crate::api::ApiClient;

pub async fn execute(json: bool, api: &ApiClient) -> Result<()> {
    let snapshot = api.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let camera = api.camera_status().await.map(|h| h.reachable).unwrap_or(false);
    print_dashboard(&snapshot, camera);
    Ok(())
}

fn print_dashboard(snapshot: &SessionSnapshot, camera_reachable: bool) {
    println!();
    println!("{}", "Vigil Status".cyan().bold());
    println!("{}", "─".repeat(50));

    println!("  {} {}", "Engine:".cyan().bold(), paint_state(snapshot.state));
    println!(
        "  {} {}",
        "Camera:".cyan().bold(),
        if camera_reachable {
            "reachable".green()
        } else {
            "unreachable".red()
        }
    );

    if let Some(ref session) = snapshot.session {
        let running_for = Utc::now().signed_duration_since(session.started_at);
        println!();
        println!("  {} {}", "Session:".cyan().bold(), session.id);
        println!(
            "    {} / {} every {}s",
            session.monitoring_type, session.style, session.interval_secs
        );
        println!(
            "    started {} ({} min ago)",
            session.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            running_for.num_minutes()
        );
        println!("    cycles: {}", snapshot.cycles);
        println!(
            "    recording: {}",
            if snapshot.recording { "yes".green() } else { "no".normal() }
        );
    }

    if let Some(ref verdict) = snapshot.last_verdict {
        println!();
        println!(
            "  {} {} threat {}/10, confidence {:.0}%",
            "Last verdict:".cyan().bold(),
            paint_status(verdict.status),
            verdict.threat_level,
            verdict.confidence_percent()
        );
        println!("    {}", truncate(&verdict.summary, 72));
        if let Some(ref action) = verdict.action {
            println!("    → {}", truncate(action, 70));
        }
    }

    if let Some(ref error) = snapshot.last_error {
        println!();
        println!("  {} {}", "Last error:".red().bold(), error);
    }

    match snapshot.state {
        EngineState::Idle => println!("\n  Start with: vigil start --type security"),
        EngineState::Faulted => println!("\n  Clear the fault with: vigil reset"),
        _ => {}
    }
    println!();
}
