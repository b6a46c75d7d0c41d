//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Vigil operator CLI
///
/// Starts, stops and inspects camera monitoring sessions on a vigil-server.
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Server base URL
    #[arg(long, global = true, env = "VIGIL_URL", default_value = "http://127.0.0.1:5000")]
    pub url: String,

    /// API key sent as a bearer token
    #[arg(long, global = true, env = "VIGIL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a monitoring session
    Start(StartArgs),

    /// Stop the running session
    Stop,

    /// Show engine state and the latest verdict
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored verdicts, newest first
    History(HistoryArgs),

    /// Capture one frame now
    Capture {
        /// Where to write the JPEG
        #[arg(short, long, default_value = "frame.jpg")]
        output: PathBuf,
    },

    /// Clear a faulted engine
    Reset,

    /// Apply the retention policy now
    Prune {
        /// Keep at most this many records (0 = unlimited)
        #[arg(long)]
        max_records: Option<u64>,

        /// Drop records older than this many days (0 = unlimited)
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Monitoring type (security, presence, lighting, classroom, workplace, custom)
    #[arg(short = 't', long = "type", default_value = "security")]
    pub monitoring_type: String,

    /// Seconds between cycles
    #[arg(short, long, default_value_t = 30)]
    pub interval: u64,

    /// Analysis style (formal, technical, casual, security, report)
    #[arg(short, long, default_value = "formal")]
    pub style: String,

    /// Extra instructions for the analysis
    #[arg(short, long)]
    pub context: Option<String>,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Number of verdicts to show
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,

    /// Only this status (NORMAL, WARNING, DANGER, UNKNOWN)
    #[arg(long)]
    pub status: Option<String>,

    /// Only this session
    #[arg(long = "session")]
    pub session_id: Option<String>,

    /// Only verdicts at or above this threat level
    #[arg(long)]
    pub min_threat: Option<u8>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_arguments() {
        let cli = Cli::try_parse_from([
            "vigil",
            "start",
            "--type",
            "presence",
            "--interval",
            "15",
            "--context",
            "front door",
        ])
        .unwrap();

        match cli.command {
            Commands::Start(args) => {
                assert_eq!(args.monitoring_type, "presence");
                assert_eq!(args.interval, 15);
                assert_eq!(args.style, "formal");
                assert_eq!(args.context.as_deref(), Some("front door"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_history_arguments() {
        let cli = Cli::try_parse_from([
            "vigil", "history", "-n", "3", "--status", "DANGER", "--session", "abc", "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::History(args) => {
                assert_eq!(args.limit, 3);
                assert_eq!(args.status.as_deref(), Some("DANGER"));
                assert_eq!(args.session_id.as_deref(), Some("abc"));
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_url_after_subcommand() {
        let cli = Cli::try_parse_from(["vigil", "status", "--url", "http://cam-box:5000"]).unwrap();
        assert_eq!(cli.url, "http://cam-box:5000");
        assert!(matches!(cli.command, Commands::Status { json: false }));
    }

    #[test]
    fn test_interval_must_be_numeric() {
        assert!(Cli::try_parse_from(["vigil", "start", "--interval", "soon"]).is_err());
    }
}
