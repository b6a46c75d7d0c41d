//! vigil - operator CLI for the Vigil monitoring engine
//!
//! Talks to a running vigil-server over its HTTP API.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod api;
mod cli;
mod commands;
mod error;

use api::ApiClient;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("vigil=warn".parse()?))
        .init();

    let cli = Cli::parse();
    let api = ApiClient::new(&cli.url, cli.api_key)?;

    match cli.command {
        Commands::Start(args) => commands::monitor::start(args, &api).await,
        Commands::Stop => commands::monitor::stop(&api).await,
        Commands::Status { json } => commands::status::execute(json, &api).await,
        Commands::History(args) => commands::history::execute(args, &api).await,
        Commands::Capture { output } => commands::capture::execute(&output, &api).await,
        Commands::Reset => commands::monitor::reset(&api).await,
        Commands::Prune {
            max_records,
            max_age_days,
        } => commands::prune::execute(max_records, max_age_days, &api).await,
        Commands::Version => {
            println!("vigil {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
