//! API client for vigil-server.

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_core::capture::CameraHealth;
use vigil_core::types::PruneReport;
use vigil_core::{SessionConfig, SessionSnapshot, Verdict};

use crate::error::{ClientError, Result};

/// HTTP client for the `/api` surface of vigil-server.
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Build request with auth headers.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("API request: {} {}", method, url);
        let mut req = self.client.request(method, &url);

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await.map_err(|source| ClientError::Unreachable {
            url: self.base_url.clone(),
            source,
        })?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => ClientError::Api {
                status,
                code: body.code,
                message: body.error,
            },
            Err(_) => ClientError::Api {
                status,
                code: "HTTP_ERROR".to_string(),
                message: if text.is_empty() {
                    "empty response".to_string()
                } else {
                    text
                },
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        self.send(req)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Monitoring
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn start(&self, config: &SessionConfig) -> Result<StartResponse> {
        self.json(self.request(Method::POST, "/api/monitoring/start").json(config))
            .await
    }

    pub async fn stop(&self) -> Result<SessionSnapshot> {
        self.json(self.request(Method::POST, "/api/monitoring/stop"))
            .await
    }

    pub async fn status(&self) -> Result<SessionSnapshot> {
        self.json(self.request(Method::GET, "/api/monitoring/status"))
            .await
    }

    pub async fn reset(&self) -> Result<SessionSnapshot> {
        self.json(self.request(Method::POST, "/api/monitoring/reset"))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History, capture and maintenance
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn history(&self, query: &HistoryQuery) -> Result<HistoryResponse> {
        self.json(self.request(Method::GET, "/api/history").query(query))
            .await
    }

    /// Capture a frame. Returns the JPEG and the path the server saved it to.
    pub async fn capture(&self) -> Result<(Vec<u8>, Option<String>)> {
        let resp = self.send(self.request(Method::POST, "/api/capture")).await?;
        let saved_at = resp
            .headers()
            .get("x-vigil-image-path")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok((bytes.to_vec(), saved_at))
    }

    pub async fn camera_status(&self) -> Result<CameraHealth> {
        self.json(self.request(Method::GET, "/api/camera/status"))
            .await
    }

    pub async fn prune(
        &self,
        max_records: Option<u64>,
        max_age_days: Option<u32>,
    ) -> Result<PruneReport> {
        let query = PruneQuery {
            max_records,
            max_age_days,
        };
        self.json(
            self.request(Method::POST, "/api/maintenance/prune")
                .query(&query),
        )
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Default, Serialize)]
pub struct HistoryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_threat_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub total: u64,
    pub count: usize,
    pub verdicts: Vec<Verdict>,
}

#[derive(Debug, Serialize)]
struct PruneQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_age_days: Option<u32>,
}
