//! Analysis client.
//!
//! Sends the baseline and current frames plus a prompt to an
//! OpenAI-compatible chat completions endpoint and returns the raw reply.
//! A simulated analyzer with canned replies stands in when no reasoning
//! service is available.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use rand::Rng;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::{AnalysisConfig, SimulatedPattern};
use crate::error::{Error, Result};

/// One request to the reasoning service
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub baseline: Bytes,
    pub current: Bytes,
    pub prompt: String,
}

/// Reasoning service client
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Returns the unstructured reply text.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat completions
// ─────────────────────────────────────────────────────────────────────────────

/// [`Analyzer`] backed by an OpenAI-compatible `/chat/completions` API
pub struct ChatCompletionsAnalyzer {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        })
    }

    fn body(&self, request: &AnalysisRequest) -> serde_json::Value {
        let image = |bytes: &Bytes| {
            serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)) }
            })
        };

        serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.prompt },
                    image(&request.baseline),
                    image(&request.current),
                ]
            }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl Analyzer for ChatCompletionsAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::AnalysisUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail: String = text.chars().take(200).collect();
            // Rejections other than rate limiting will not succeed on retry.
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(Error::AnalysisUnavailable(format!("{}: {}", status, detail)));
            }
            return Err(Error::Other(format!("analysis rejected ({}): {}", status, detail)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::AnalysisUnavailable(format!("unreadable response: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::AnalysisUnavailable("empty response".into()))?;

        debug!(chars = content.len(), "Analysis received");
        Ok(content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulated
// ─────────────────────────────────────────────────────────────────────────────

struct Canned {
    name: &'static str,
    status: &'static str,
    confidence: u8,
    threat_level: u8,
    summary: &'static str,
    analysis: &'static str,
    action: &'static str,
}

static CANNED: [Canned; 6] = [
    Canned {
        name: "normal",
        status: "NORMAL",
        confidence: 85,
        threat_level: 1,
        summary: "No significant changes detected",
        analysis: "The scene is stable with normal lighting and no suspicious activity.",
        action: "Continue monitoring",
    },
    Canned {
        name: "warning",
        status: "WARNING",
        confidence: 92,
        threat_level: 6,
        summary: "Minor environmental changes detected",
        analysis: "Some objects appear to have moved or the lighting changed slightly.",
        action: "Monitor closely for further changes",
    },
    Canned {
        name: "danger",
        status: "DANGER",
        confidence: 96,
        threat_level: 9,
        summary: "Significant change or potential intrusion detected",
        analysis: "Major differences from the reference scene suggest intrusion or equipment failure.",
        action: "Verify the area immediately",
    },
    Canned {
        name: "lighting",
        status: "WARNING",
        confidence: 88,
        threat_level: 3,
        summary: "Lighting conditions changed",
        analysis: "Lights were switched on or off and overall brightness differs noticeably.",
        action: "Check lighting and electrical settings",
    },
    Canned {
        name: "movement",
        status: "WARNING",
        confidence: 90,
        threat_level: 4,
        summary: "Movement or activity detected",
        analysis: "Objects may have moved or a person was present in the scene.",
        action: "Verify recent activity in the area",
    },
    Canned {
        name: "equipment",
        status: "WARNING",
        confidence: 87,
        threat_level: 5,
        summary: "Equipment status changed",
        analysis: "Devices appear to have powered on or off or changed operating state.",
        action: "Check equipment and power status",
    },
];

/// [`Analyzer`] returning canned labelled replies without network access
pub struct SimulatedAnalyzer {
    pattern: SimulatedPattern,
    fixed: usize,
    next: AtomicUsize,
}

impl SimulatedAnalyzer {
    pub fn new(pattern: SimulatedPattern, fixed_response: &str) -> Self {
        let fixed = CANNED
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(fixed_response.trim()))
            .unwrap_or(0);
        Self {
            pattern,
            fixed,
            next: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.simulated_pattern, &config.simulated_response)
    }

    /// Names accepted as the fixed response.
    pub fn response_names() -> impl Iterator<Item = &'static str> {
        CANNED.iter().map(|c| c.name)
    }

    fn pick(&self) -> &'static Canned {
        let idx = match self.pattern {
            SimulatedPattern::Fixed => self.fixed,
            SimulatedPattern::Sequential => self.next.fetch_add(1, Ordering::Relaxed) % CANNED.len(),
            SimulatedPattern::Random => rand::thread_rng().gen_range(0..CANNED.len()),
        };
        &CANNED[idx]
    }
}

#[async_trait]
impl Analyzer for SimulatedAnalyzer {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<String> {
        let c = self.pick();
        debug!(response = c.name, "Simulated analysis");
        Ok(format!(
            "SIMULATED RESPONSE\n\nSTATUS: {}\nCONFIDENCE: {}\nTHREAT_LEVEL: {}\nSUMMARY: {}\nANALYSIS: {}\nACTION: {}",
            c.status, c.confidence, c.threat_level, c.summary, c.analysis, c.action
        ))
    }
}
