//! Shared types for vigil-core.
//!
//! These types cross the boundary between the engine, the result store and
//! the presentation layer (HTTP API, chat bot, CLI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one monitoring run.
pub type SessionId = String;

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// What the camera is watching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringType {
    Security,
    Presence,
    Lighting,
    Classroom,
    Workplace,
    Custom,
}

impl MonitoringType {
    pub const ALL: [MonitoringType; 6] = [
        MonitoringType::Security,
        MonitoringType::Presence,
        MonitoringType::Lighting,
        MonitoringType::Classroom,
        MonitoringType::Workplace,
        MonitoringType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringType::Security => "security",
            MonitoringType::Presence => "presence",
            MonitoringType::Lighting => "lighting",
            MonitoringType::Classroom => "classroom",
            MonitoringType::Workplace => "workplace",
            MonitoringType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for MonitoringType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MonitoringType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        MonitoringType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("Invalid monitoring type: {}", s))
    }
}

/// Tone of the analysis the reasoning service is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStyle {
    Formal,
    Technical,
    Casual,
    Security,
    Report,
}

impl AnalysisStyle {
    pub const ALL: [AnalysisStyle; 5] = [
        AnalysisStyle::Formal,
        AnalysisStyle::Technical,
        AnalysisStyle::Casual,
        AnalysisStyle::Security,
        AnalysisStyle::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStyle::Formal => "formal",
            AnalysisStyle::Technical => "technical",
            AnalysisStyle::Casual => "casual",
            AnalysisStyle::Security => "security",
            AnalysisStyle::Report => "report",
        }
    }
}

impl std::fmt::Display for AnalysisStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisStyle {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        AnalysisStyle::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("Invalid analysis style: {}", s))
    }
}

/// Classified outcome of one analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Normal,
    Warning,
    Danger,
    Unknown,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Normal => "NORMAL",
            VerdictStatus::Warning => "WARNING",
            VerdictStatus::Danger => "DANGER",
            VerdictStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerdictStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Ok(VerdictStatus::Normal),
            "WARNING" => Ok(VerdictStatus::Warning),
            "DANGER" => Ok(VerdictStatus::Danger),
            "UNKNOWN" => Ok(VerdictStatus::Unknown),
            _ => Err(format!("Invalid verdict status: {}", s)),
        }
    }
}

/// Lifecycle state of the monitoring engine.
///
/// ```text
/// Idle ──start──► Starting ──baseline──► Running ──stop──► Stopping ──► Idle
///                    │                      │
///                    └──────── fatal ───────┴──────► Faulted ──reset──► Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Starting,
    Running,
    Stopping,
    Faulted,
}

impl EngineState {
    /// A session exists (or is being set up) in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Starting | EngineState::Running)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Starting => write!(f, "starting"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopping => write!(f, "stopping"),
            EngineState::Faulted => write!(f, "faulted"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request to start a monitoring session, as received from a front end.
///
/// Type and style arrive as free text and are validated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "type", alias = "monitoring_type")]
    pub monitoring_type: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(rename = "interval", alias = "interval_secs")]
    pub interval_secs: u64,
    #[serde(default, alias = "context")]
    pub custom_instructions: Option<String>,
}

fn default_style() -> String {
    AnalysisStyle::Formal.as_str().to_string()
}

impl SessionConfig {
    pub fn new(monitoring_type: MonitoringType, style: AnalysisStyle, interval_secs: u64) -> Self {
        Self {
            monitoring_type: monitoring_type.as_str().to_string(),
            style: style.as_str().to_string(),
            interval_secs,
            custom_instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }
}

/// One validated monitoring run. Owned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub monitoring_type: MonitoringType,
    pub style: AnalysisStyle,
    pub interval_secs: u64,
    pub custom_instructions: Option<String>,
    pub started_at: DateTime<Utc>,
    pub baseline_path: Option<String>,
}

/// Point-in-time view of the engine for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: EngineState,
    pub session: Option<Session>,
    pub cycles: u64,
    pub last_verdict: Option<Verdict>,
    pub last_error: Option<String>,
    pub recording: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Verdict Types
// ─────────────────────────────────────────────────────────────────────────────

/// Structured outcome of one analysis cycle.
///
/// Threat level and confidence are always present, even when the analysis
/// text could not be parsed (`parsed == false`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub id: Option<i64>,
    pub session_id: SessionId,
    pub monitoring_type: MonitoringType,
    pub status: VerdictStatus,
    /// 0..=10
    pub threat_level: u8,
    /// 0.0..=1.0
    pub confidence: f64,
    pub summary: String,
    pub action: Option<String>,
    pub raw_text: String,
    pub parsed: bool,
    pub timestamp: DateTime<Utc>,
    pub image_path: Option<String>,
    pub video_path: Option<String>,
}

impl Verdict {
    /// Degraded verdict for a cycle whose capture or analysis failed.
    pub fn unavailable(
        session_id: &str,
        monitoring_type: MonitoringType,
        reason: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            session_id: session_id.to_string(),
            monitoring_type,
            status: VerdictStatus::Unknown,
            threat_level: 0,
            confidence: 0.0,
            summary: reason.to_string(),
            action: None,
            raw_text: reason.to_string(),
            parsed: false,
            timestamp,
            image_path: None,
            video_path: None,
        }
    }

    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query Types
// ─────────────────────────────────────────────────────────────────────────────

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
/// Hard cap on history page size.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Filter and pagination for history queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub status: Option<VerdictStatus>,
    #[serde(default)]
    pub min_threat_level: Option<u8>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    /// Oldest first when set; newest first otherwise.
    #[serde(default)]
    pub ascending: bool,
}

impl HistoryFilter {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// How long stored verdicts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum number of records kept (0 = unlimited).
    #[serde(default = "default_max_records")]
    pub max_records: u64,
    /// Maximum record age in days (0 = unlimited).
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

fn default_max_records() -> u64 {
    10_000
}

fn default_max_age_days() -> u32 {
    30
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            max_age_days: default_max_age_days(),
        }
    }
}

/// Outcome of a retention pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed: usize,
    /// Image and video files referenced only by the removed records.
    pub media_paths: Vec<String>,
}
