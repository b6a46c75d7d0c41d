//! API key middleware for vigil-server.
//!
//! When `server.api_key` is set, `/api` routes require it as
//! `Authorization: Bearer <key>` or `X-Vigil-Api-Key: <key>`.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ErrorResponse;
use crate::state::AppState;

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    MissingKey,
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (error, code) = match self {
            AuthError::MissingKey => ("Missing API key", "MISSING_KEY"),
            AuthError::InvalidKey => ("Invalid API key", "INVALID_KEY"),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        });

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Authentication middleware for axum
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(expected) = state.config.server.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get("X-Vigil-Api-Key")
        .or_else(|| request.headers().get("Authorization"));

    let provided = match header {
        Some(value) => value.to_str().map_err(|_| AuthError::InvalidKey)?,
        None => return Err(AuthError::MissingKey),
    };

    // Remove "Bearer " prefix if present
    let provided = provided.trim_start_matches("Bearer ").trim();

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(AuthError::InvalidKey);
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }
}
