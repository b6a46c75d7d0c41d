//! Server configuration.
//!
//! Precedence: `VIGIL_*` environment variables > config file > defaults.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use vigil_core::config::{
    AnalysisConfig, AnalysisMode, CameraConfig, EngineConfig, RecordingConfig, StorageConfig,
    TelegramConfig,
};

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (default: 127.0.0.1:5000)
    pub bind: String,

    /// Bearer key required on `/api` routes; open when unset
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            api_key: None,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for vigil crates when RUST_LOG is unset (default: info)
    pub level: String,

    /// Emit JSON lines instead of human-readable output (default: false)
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub camera: CameraConfig,
    pub analysis: AnalysisConfig,
    pub telegram: TelegramConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,

    /// Root for relative paths
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// File the configuration was read from
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment, the config file and defaults
    ///
    /// Directory layout:
    /// ```text
    /// ~/.vigil/                 # or $VIGIL_DIR
    /// ├── config.toml           # or $VIGIL_CONFIG
    /// ├── vigil.db              # result store
    /// └── media/
    ///     ├── images/           # baseline, current and on-demand frames
    ///     └── videos/           # session recordings
    /// ```
    pub fn load() -> anyhow::Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = std::env::var("VIGIL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".vigil"));
        let config_path = std::env::var("VIGIL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("config.toml"));

        Self::load_from(&data_dir, &config_path, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_from(
        data_dir: &Path,
        config_path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config: Config = if config_path.exists() {
            let text = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?
        } else {
            Config::default()
        };

        config.data_dir = data_dir.to_path_buf();
        config.config_path = config_path.to_path_buf();
        config.apply_env(env)?;
        config.resolve_paths();
        config.validate()?;

        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.storage.images_dir)?;
        std::fs::create_dir_all(&config.recording.videos_dir)?;
        if let Some(parent) = config.storage.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("VIGIL_CAMERA_URL") {
            self.camera.base_url = v;
        }
        if let Some(v) = non_empty("VIGIL_ANALYSIS_URL") {
            self.analysis.base_url = v;
        }
        if let Some(v) = non_empty("VIGIL_ANALYSIS_API_KEY") {
            self.analysis.api_key = Some(v);
        }
        if let Some(v) = non_empty("VIGIL_ANALYSIS_MODEL") {
            self.analysis.model = v;
        }
        if let Some(v) = non_empty("VIGIL_ANALYSIS_MODE") {
            self.analysis.mode = match v.to_ascii_lowercase().as_str() {
                "live" => AnalysisMode::Live,
                "simulated" | "test" => AnalysisMode::Simulated,
                other => bail!("VIGIL_ANALYSIS_MODE must be live or simulated, got {other}"),
            };
        }
        if let Some(v) = non_empty("VIGIL_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = non_empty("VIGIL_API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = non_empty("VIGIL_TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = non_empty("VIGIL_TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
        if let Some(v) = non_empty("VIGIL_TELEGRAM_ENABLED") {
            self.telegram.enabled = parse_bool(&v)
                .with_context(|| format!("VIGIL_TELEGRAM_ENABLED must be true or false, got {v}"))?;
        }
        Ok(())
    }

    fn resolve_paths(&mut self) {
        let base = self.data_dir.clone();
        for path in [
            &mut self.storage.database_path,
            &mut self.storage.images_dir,
            &mut self.recording.videos_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;

        self.bind_addr()?;

        if self.telegram.enabled && !self.telegram.is_usable() {
            bail!("telegram.enabled requires bot_token and a numeric chat_id");
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address {}", self.server.bind))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
