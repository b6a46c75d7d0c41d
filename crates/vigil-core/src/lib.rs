//! vigil-core - Core library for Vigil
//!
//! The monitoring orchestration engine and the collaborators it drives:
//!
//! - **monitor**: Session state machine and the capture/analyze/store/notify cycle
//! - **capture**: Camera still frames, health and MJPEG stream
//! - **recording**: Background video recording per session
//! - **analysis**: Reasoning service clients (live and simulated)
//! - **prompt**: Role and style specific prompts
//! - **interpreter**: Tolerant parsing of analysis replies into verdicts
//! - **notify**: Alert policy, message formatting and Telegram delivery
//! - **store**: SQLite result store with retention
//! - **media**: Image files
//! - **retry**: Bounded retry with backoff and per-attempt timeouts

pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod media;
pub mod monitor;
pub mod notify;
pub mod prompt;
pub mod recording;
pub mod retry;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use monitor::{Collaborators, Monitor};
pub use store::{Database, ResultStore};
pub use types::{
    AnalysisStyle, EngineState, HistoryFilter, MonitoringType, RetentionPolicy, Session,
    SessionConfig, SessionId, SessionSnapshot, Verdict, VerdictStatus,
};
