//! Error types for the vigil CLI.

use thiserror::Error;

/// Failure talking to a vigil-server.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot reach vigil-server at {url}: {source}. Is vigil-server running?")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an `{error, code}` body.
    #[error("{message} ({code}, HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Machine-readable code from the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
