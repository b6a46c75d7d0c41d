//! Shared fixtures for route and bot tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vigil_core::analysis::SimulatedAnalyzer;
use vigil_core::capture::{CameraHealth, Frame, FrameSource};
use vigil_core::config::{EngineConfig, SimulatedPattern};
use vigil_core::media::MediaStore;
use vigil_core::retry::RetryPolicy;
use vigil_core::{Collaborators, Database, Monitor, Result};

use crate::config::Config;
use crate::state::AppState;

pub struct StillCamera;

#[async_trait]
impl FrameSource for StillCamera {
    async fn capture(&self) -> Result<Frame> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.resize(2046, 0x42);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        Frame::from_jpeg(Bytes::from(jpeg), 1000)
    }

    async fn health(&self) -> Result<CameraHealth> {
        Ok(CameraHealth {
            reachable: true,
            details: serde_json::json!({ "uptime": 42 }),
        })
    }
}

fn fast_engine() -> EngineConfig {
    let fast = RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
        attempt_timeout_secs: 2,
    };
    EngineConfig {
        capture_retry: fast,
        analysis_retry: fast,
        min_interval_secs: 1,
        ..Default::default()
    }
}

/// Engine over `db`, the given camera and canned analysis
pub fn test_monitor(frames: Arc<dyn FrameSource>, db: Arc<Database>, dir: &Path) -> Arc<Monitor> {
    Monitor::new(
        Collaborators {
            frames,
            recorder: None,
            analyzer: Arc::new(SimulatedAnalyzer::new(SimulatedPattern::Fixed, "normal")),
            store: db,
            notifier: None,
            media: MediaStore::new(dir.join("images")),
        },
        fast_engine(),
    )
}

/// App state over an in-memory store, a still camera and canned analysis
pub fn test_state(api_key: Option<&str>) -> (Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let monitor = test_monitor(Arc::new(StillCamera), db.clone(), dir.path());

    let mut config = Config::default();
    config.engine = fast_engine();
    config.server.api_key = api_key.map(str::to_string);

    (AppState::new(config, monitor, db), dir)
}
