//! Session lifecycle commands: start, stop, reset.

use anyhow::Result;
use colored::Colorize;
use vigil_core::SessionConfig;

use crate::api::ApiClient;
use crate::cli::StartArgs;

impl From<StartArgs> for SessionConfig {
    fn from(args: StartArgs) -> Self {
        SessionConfig {
            monitoring_type: args.monitoring_type,
            style: args.style,
            interval_secs: args.interval,
            custom_instructions: args.context,
        }
    }
}

pub async fn start(args: StartArgs, api: &ApiClient) -> Result<()> {
    let config = SessionConfig::from(args);
    let started = match api.start(&config).await {
        Ok(started) => started,
        Err(e) if e.code() == Some("ENGINE_FAULTED") => {
            eprintln!("{} {}", "✗".red(), e);
            eprintln!("  Clear the fault with: vigil reset");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{} Monitoring started: {}",
        "✓".green(),
        started.session_id.cyan().bold()
    );
    if let Some(session) = &started.snapshot.session {
        println!("  Type:     {}", session.monitoring_type);
        println!("  Style:    {}", session.style);
        println!("  Interval: {}s", session.interval_secs);
        if let Some(ref context) = session.custom_instructions {
            println!("  Context:  {}", context);
        }
    }
    Ok(())
}

pub async fn stop(api: &ApiClient) -> Result<()> {
    match api.stop().await {
        Ok(snapshot) => {
            println!(
                "{} Monitoring stopped after {} cycle(s)",
                "✓".green(),
                snapshot.cycles
            );
            Ok(())
        }
        Err(e) if e.code() == Some("NOT_RUNNING") => {
            println!("{} No monitoring session is running", "•".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn reset(api: &ApiClient) -> Result<()> {
    let snapshot = api.reset().await?;
    println!("{} Engine reset ({})", "✓".green(), snapshot.state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_args_map_onto_session_config() {
        let config = SessionConfig::from(StartArgs {
            monitoring_type: "lighting".to_string(),
            interval: 45,
            style: "casual".to_string(),
            context: None,
        });

        assert_eq!(config.monitoring_type, "lighting");
        assert_eq!(config.style, "casual");
        assert_eq!(config.interval_secs, 45);
        assert!(config.custom_instructions.is_none());
    }
}
