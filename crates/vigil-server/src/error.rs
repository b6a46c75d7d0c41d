//! Mapping of engine errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use vigil_core::Error;

/// JSON error body shared by every route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Engine error returned from a handler
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::SessionAlreadyActive { .. } | Error::AlreadyRecording(_) | Error::NotRunning => {
                StatusCode::CONFLICT
            }
            Error::EngineFaulted(_) => StatusCode::LOCKED,
            Error::CaptureUnavailable(_) | Error::AnalysisUnavailable(_) | Error::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
        });

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::InvalidConfig("x".into()), StatusCode::BAD_REQUEST),
            (
                Error::SessionAlreadyActive {
                    session_id: "a".into(),
                },
                StatusCode::CONFLICT,
            ),
            (Error::NotRunning, StatusCode::CONFLICT),
            (Error::EngineFaulted("disk".into()), StatusCode::LOCKED),
            (
                Error::CaptureUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (Error::StoreFailure("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_body_carries_error_code() {
        let response = ApiError(Error::NotRunning).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "NOT_RUNNING");
        assert_eq!(body["error"], "No active monitoring session");
    }
}
