//! vigil-server - Vigil backend server
//!
//! HTTP API, Telegram command poller and retention task over one
//! monitoring engine.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vigil_core::analysis::{Analyzer, ChatCompletionsAnalyzer, SimulatedAnalyzer};
use vigil_core::capture::HttpCamera;
use vigil_core::config::AnalysisMode;
use vigil_core::media::MediaStore;
use vigil_core::notify::{Notifier, TelegramNotifier};
use vigil_core::recording::{Recorder, RecordingController};
use vigil_core::{Collaborators, Database, Monitor};

mod config;
mod error;
mod middleware;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use config::{Config, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_logging(&config.logging)?;

    info!("vigil-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Config loaded from {:?}", config.config_path);

    let db = Arc::new(Database::open(&config.storage.database_path)?);
    info!(path = %config.storage.database_path.display(), "Result store opened");

    let camera = Arc::new(HttpCamera::new(&config.camera)?);

    let recorder: Option<Arc<dyn Recorder>> = if config.recording.enabled {
        Some(Arc::new(RecordingController::new(
            config.recording.clone(),
            camera.clone(),
        )))
    } else {
        None
    };

    let analyzer: Arc<dyn Analyzer> = match config.analysis.mode {
        AnalysisMode::Live => {
            if config.analysis.api_key.is_none() {
                warn!("No analysis API key configured; requests are sent unauthenticated");
            }
            Arc::new(ChatCompletionsAnalyzer::new(&config.analysis)?)
        }
        AnalysisMode::Simulated => {
            warn!("Analysis runs in simulated mode; verdicts are canned");
            Arc::new(SimulatedAnalyzer::from_config(&config.analysis))
        }
    };

    let telegram = if config.telegram.is_usable() {
        Some(Arc::new(TelegramNotifier::new(&config.telegram)?))
    } else {
        info!("Telegram disabled; alerts are stored only");
        None
    };
    let notifier = telegram.clone().map(|t| t as Arc<dyn Notifier>);

    let monitor = Monitor::new(
        Collaborators {
            frames: camera,
            recorder,
            analyzer,
            store: db.clone(),
            notifier,
            media: MediaStore::new(config.storage.images_dir.clone()),
        },
        config.engine.clone(),
    );

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    if config.storage.cleanup_interval_hours > 0 {
        tasks.push(tokio::spawn(services::retention::run(
            monitor.clone(),
            config.storage.retention,
            Duration::from_secs(config.storage.cleanup_interval_hours * 3600),
            shutdown.clone(),
        )));
    }

    if let Some(bot) = telegram {
        tasks.push(tokio::spawn(services::bot::run(
            monitor.clone(),
            bot,
            config.telegram.clone(),
            shutdown.clone(),
        )));
    }

    let addr = config.bind_addr()?;
    let state = state::AppState::new(config, monitor.clone(), db);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    shutdown.cancel();
    monitor.shutdown().await;
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("vigil_server={}", logging.level).parse()?)
        .add_directive(format!("vigil_core={}", logging.level).parse()?);

    if logging.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
