//! API route modules.

pub mod capture;
pub mod health;
pub mod history;
pub mod maintenance;
pub mod monitoring;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health::health_check));

    // Protected routes (API key when configured)
    let protected_routes = Router::new()
        .merge(monitoring::router())
        .merge(history::router())
        .merge(capture::router())
        .merge(maintenance::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use vigil_core::{MonitoringType, ResultStore, Verdict};

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_of(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (state, _dir) = test_state(Some("secret"));
        let router = create_router(state);

        let (status, body) = send(&router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_of(&body);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["engine"], "idle");
        assert_eq!(body["components"]["database"], true);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (state, _dir) = test_state(None);
        let router = create_router(state);
        let start = json!({ "type": "security", "interval": 30, "style": "casual" });

        let (status, body) = send(&router, post("/api/monitoring/start", start.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let session_id = json_of(&body)["session_id"].as_str().unwrap().to_string();

        let (status, body) = send(&router, post("/api/monitoring/start", start)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let body = json_of(&body);
        assert_eq!(body["code"], "SESSION_ALREADY_ACTIVE");
        assert!(body["error"].as_str().unwrap().contains(&session_id));

        let (status, body) = send(&router, get("/api/monitoring/status")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_of(&body);
        assert_eq!(body["state"], "running");
        assert_eq!(body["session"]["id"], session_id.as_str());

        let (status, body) = send(&router, post("/api/monitoring/stop", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["state"], "idle");

        let (status, body) = send(&router, post("/api/monitoring/stop", json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json_of(&body)["code"], "NOT_RUNNING");
    }

    #[tokio::test]
    async fn test_invalid_start_is_bad_request() {
        let (state, _dir) = test_state(None);
        let router = create_router(state);

        let (status, body) = send(
            &router,
            post("/api/monitoring/start", json!({ "type": "parking", "interval": 30 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["code"], "INVALID_CONFIG");
    }

    #[tokio::test]
    async fn test_history_filters_and_validates() {
        let (state, _dir) = test_state(None);
        let mut danger = Verdict::unavailable("s1", MonitoringType::Security, "intruder", Utc::now());
        danger.status = vigil_core::VerdictStatus::Danger;
        danger.threat_level = 8;
        state.db.append(&danger).unwrap();
        state
            .db
            .append(&Verdict::unavailable("s1", MonitoringType::Security, "quiet", Utc::now()))
            .unwrap();
        let router = create_router(state);

        let (status, body) = send(&router, get("/api/history?status=danger")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_of(&body);
        assert_eq!(body["total"], 2);
        assert_eq!(body["count"], 1);
        assert_eq!(body["verdicts"][0]["summary"], "intruder");

        let (status, _) = send(&router, get("/api/history?status=purple")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, get("/api/history?order=sideways")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_capture_returns_jpeg() {
        let (state, _dir) = test_state(None);
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(post("/api/capture", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/jpeg");
        assert!(response.headers().contains_key("x-vigil-image-path"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let (state, _dir) = test_state(Some("secret"));
        let router = create_router(state);

        let (status, body) = send(&router, get("/api/monitoring/status")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json_of(&body)["code"], "MISSING_KEY");

        let wrong = Request::builder()
            .uri("/api/monitoring/status")
            .header("Authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&router, wrong).await.0, StatusCode::UNAUTHORIZED);

        let right = Request::builder()
            .uri("/api/monitoring/status")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&router, right).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_prune_uses_query_overrides() {
        let (state, _dir) = test_state(None);
        for _ in 0..3 {
            state
                .db
                .append(&Verdict::unavailable("s1", MonitoringType::Security, "x", Utc::now()))
                .unwrap();
        }
        let router = create_router(state);

        let (status, body) = send(
            &router,
            post("/api/maintenance/prune?max_records=1&max_age_days=0", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["removed"], 2);
    }
}
