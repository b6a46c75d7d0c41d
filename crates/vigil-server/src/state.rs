//! Application state.

use std::sync::Arc;
use std::time::Instant;
use vigil_core::{Database, Monitor};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Monitoring engine; every route goes through it
    pub monitor: Arc<Monitor>,
    /// Result store, for health checks
    pub db: Arc<Database>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, monitor: Arc<Monitor>, db: Arc<Database>) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            monitor,
            db,
            start_time: Instant::now(),
        })
    }
}
