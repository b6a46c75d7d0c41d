//! Camera capture client.
//!
//! Still frames come from `GET /capture`, device health from `GET /status`
//! and continuous video from the multipart MJPEG stream at `GET /stream`.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::CameraConfig;
use crate::error::{Error, Result};

/// JPEG start-of-image marker
const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
const EOI: [u8; 2] = [0xFF, 0xD9];
/// Frames larger than this are treated as stream corruption
const MAX_STREAM_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// One still image from the camera
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Bytes,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Accept `bytes` as a frame if it looks like a complete JPEG.
    pub fn from_jpeg(bytes: Bytes, min_bytes: usize) -> Result<Self> {
        if bytes.len() < min_bytes {
            return Err(Error::CaptureUnavailable(format!(
                "malformed frame: {} bytes (minimum {})",
                bytes.len(),
                min_bytes
            )));
        }
        if !bytes.starts_with(&SOI) {
            return Err(Error::CaptureUnavailable(
                "malformed frame: missing JPEG header".into(),
            ));
        }
        Ok(Self {
            bytes,
            captured_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Device health as reported by `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraHealth {
    pub reachable: bool,
    pub details: serde_json::Value,
}

/// Source of still frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Frame>;

    async fn health(&self) -> Result<CameraHealth>;
}

/// An open video stream yielding individual JPEG frames
#[async_trait]
pub trait FrameStream: Send {
    /// Next complete frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<Bytes>>;
}

/// Opens video streams for the recording controller
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn FrameStream>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP camera
// ─────────────────────────────────────────────────────────────────────────────

/// Camera reached over plain HTTP
#[derive(Clone)]
pub struct HttpCamera {
    base_url: String,
    timeout: Duration,
    min_frame_bytes: usize,
    client: reqwest::Client,
}

impl HttpCamera {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            min_frame_bytes: config.min_frame_bytes,
            client,
        })
    }

    pub fn stream_url(&self) -> String {
        format!("{}/stream", self.base_url)
    }
}

#[async_trait]
impl FrameSource for HttpCamera {
    async fn capture(&self) -> Result<Frame> {
        let url = format!("{}/capture", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::CaptureUnavailable(format!("camera returned {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;
        debug!(bytes = bytes.len(), "Frame captured");
        Frame::from_jpeg(bytes, self.min_frame_bytes)
    }

    async fn health(&self) -> Result<CameraHealth> {
        let url = format!("{}/status", self.base_url);
        let response = match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                return Ok(CameraHealth {
                    reachable: false,
                    details: serde_json::json!({ "error": e.to_string() }),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(CameraHealth {
                reachable: false,
                details: serde_json::json!({ "http_status": status.as_u16() }),
            });
        }

        // Firmware versions differ; anything that is not JSON is kept as text.
        let text = response.text().await.unwrap_or_default();
        let details = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        Ok(CameraHealth {
            reachable: true,
            details,
        })
    }
}

#[async_trait]
impl StreamSource for HttpCamera {
    async fn open(&self) -> Result<Box<dyn FrameStream>> {
        let response = self
            .client
            .get(self.stream_url())
            .send()
            .await
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::CaptureUnavailable(format!(
                "stream returned {}",
                response.status()
            )));
        }

        Ok(Box::new(HttpFrameStream {
            response,
            splitter: MjpegSplitter::new(),
        }))
    }
}

struct HttpFrameStream {
    response: reqwest::Response,
    splitter: MjpegSplitter,
}

#[async_trait]
impl FrameStream for HttpFrameStream {
    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.splitter.next_frame() {
                return Ok(Some(frame));
            }
            match self
                .response
                .chunk()
                .await
                .map_err(|e| Error::CaptureUnavailable(e.to_string()))?
            {
                Some(chunk) => self.splitter.push(&chunk),
                None => return Ok(None),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MJPEG splitting
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts JPEG images from a multipart MJPEG byte stream.
///
/// Multipart boundaries and part headers are skipped; a frame is everything
/// from an SOI marker up to and including the next EOI marker.
#[derive(Debug, Default)]
pub struct MjpegSplitter {
    buf: BytesMut,
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let Some(start) = find(&self.buf, &SOI, 0) else {
                // Keep a trailing 0xFF, it may be the first half of an SOI.
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let drop = self.buf.len() - keep;
                let _ = self.buf.split_to(drop);
                return None;
            };
            let _ = self.buf.split_to(start);

            match find(&self.buf, &EOI, SOI.len()) {
                Some(end) => return Some(self.buf.split_to(end + EOI.len()).freeze()),
                None if self.buf.len() > MAX_STREAM_FRAME_BYTES => {
                    // No end marker within a sane distance; resync on the next SOI.
                    let _ = self.buf.split_to(SOI.len());
                }
                None => return None,
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < needle.len() || from > haystack.len() - needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Minimal JPEG-shaped payload for tests.
#[cfg(test)]
pub(crate) fn test_jpeg(len: usize, fill: u8) -> Vec<u8> {
    let mut v = Vec::with_capacity(len.max(4));
    v.extend_from_slice(&SOI);
    v.resize(len.max(4) - 2, fill);
    v.extend_from_slice(&EOI);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn camera(base_url: &str) -> HttpCamera {
        HttpCamera::new(&CameraConfig {
            base_url: base_url.to_string(),
            timeout_secs: 2,
            min_frame_bytes: 1000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_capture_returns_frame() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/capture"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(test_jpeg(2048, 0x11)))
            .mount(&server)
            .await;

        let frame = camera(&server.uri()).capture().await.unwrap();
        assert_eq!(frame.len(), 2048);
    }

    #[tokio::test]
    async fn test_capture_rejects_small_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/capture"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(test_jpeg(200, 0x11)))
            .mount(&server)
            .await;

        let err = camera(&server.uri()).capture().await.unwrap_err();
        assert!(matches!(err, Error::CaptureUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_capture_rejects_non_jpeg() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/capture"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
            .mount(&server)
            .await;

        let err = camera(&server.uri()).capture().await.unwrap_err();
        assert!(err.to_string().contains("JPEG"));
    }

    #[tokio::test]
    async fn test_capture_non_2xx_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/capture"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = camera(&server.uri()).capture().await.unwrap_err();
        assert!(matches!(err, Error::CaptureUnavailable(_)));
    }

    #[tokio::test]
    async fn test_health_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "framesize": 8, "quality": 10 })),
            )
            .mount(&server)
            .await;

        let health = camera(&server.uri()).health().await.unwrap();
        assert!(health.reachable);
        assert_eq!(health.details["quality"], 10);
    }

    #[tokio::test]
    async fn test_health_unreachable_is_reported() {
        let health = camera("http://127.0.0.1:9").health().await.unwrap();
        assert!(!health.reachable);
    }

    #[test]
    fn test_stream_url() {
        assert_eq!(camera("http://cam.local/").stream_url(), "http://cam.local/stream");
    }

    #[test]
    fn test_splitter_extracts_frames_across_chunks() {
        let a = test_jpeg(64, 0x01);
        let b = test_jpeg(80, 0x02);
        let mut body = Vec::new();
        body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&a);
        body.extend_from_slice(b"\r\n--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&b);
        body.extend_from_slice(b"\r\n");

        let mut splitter = MjpegSplitter::new();
        let mut frames = Vec::new();
        for chunk in body.chunks(7) {
            splitter.push(chunk);
            while let Some(f) = splitter.next_frame() {
                frames.push(f);
            }
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &a[..]);
        assert_eq!(&frames[1][..], &b[..]);
    }

    #[test]
    fn test_splitter_waits_for_end_marker() {
        let frame = test_jpeg(32, 0x05);
        let mut splitter = MjpegSplitter::new();
        splitter.push(&frame[..20]);
        assert!(splitter.next_frame().is_none());
        splitter.push(&frame[20..]);
        assert_eq!(splitter.next_frame().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_stream_yields_frames_then_ends() {
        let server = MockServer::start().await;
        let mut body = Vec::new();
        for fill in [0x01, 0x02, 0x03] {
            body.extend_from_slice(b"--frame\r\n\r\n");
            body.extend_from_slice(&test_jpeg(1500, fill));
        }
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let mut stream = camera(&server.uri()).open().await.unwrap();
        let mut count = 0;
        while let Some(frame) = stream.next_frame().await.unwrap() {
            assert_eq!(frame.len(), 1500);
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
