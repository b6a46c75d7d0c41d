//! Error types for vigil-core.

use thiserror::Error;

/// Result type alias using vigil-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for monitoring operations
#[derive(Error, Debug)]
pub enum Error {
    // Pre-flight errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Collaborator errors (retried, then tolerated inside a cycle)
    #[error("Camera capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Analysis service unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    // Concurrency guard violations
    #[error("Session {0} is already recording")]
    AlreadyRecording(String),

    #[error("Monitoring session already active: {session_id}")]
    SessionAlreadyActive { session_id: String },

    #[error("No active monitoring session")]
    NotRunning,

    // Durability errors
    #[error("Result store failure: {0}")]
    StoreFailure(String),

    #[error("Engine faulted: {0}. Reset required before starting a new session")]
    EngineFaulted(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a retry could plausibly succeed.
    ///
    /// Transport hiccups, timeouts and 5xx responses from a collaborator are
    /// retryable; configuration and guard violations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::CaptureUnavailable(_)
            | Error::AnalysisUnavailable(_)
            | Error::Delivery(_)
            | Error::Timeout(_)
            | Error::Io(_) => true,
            Error::Http(e) => match e.status() {
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                None => true,
            },
            _ => false,
        }
    }

    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::CaptureUnavailable(_) => "CAPTURE_UNAVAILABLE",
            Error::AnalysisUnavailable(_) => "ANALYSIS_UNAVAILABLE",
            Error::Delivery(_) => "DELIVERY_FAILED",
            Error::Timeout(_) => "TIMEOUT",
            Error::AlreadyRecording(_) => "ALREADY_RECORDING",
            Error::SessionAlreadyActive { .. } => "SESSION_ALREADY_ACTIVE",
            Error::NotRunning => "NOT_RUNNING",
            Error::StoreFailure(_) => "STORE_FAILURE",
            Error::EngineFaulted(_) => "ENGINE_FAULTED",
            Error::Database(_) | Error::LockPoisoned => "DATABASE_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
