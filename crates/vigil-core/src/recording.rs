//! Recording controller.
//!
//! One background task per session pulls frames from a [`StreamSource`] and
//! appends them to an MJPEG file. The task ends on cancellation, when the
//! stream ends, or after `max_duration_secs`; its outcome is handed back
//! through a oneshot channel and observed by `close` or `take_finished`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::StreamSource;
use crate::config::RecordingConfig;
use crate::error::{Error, Result};

/// Live reference to an in-flight recording
#[derive(Debug, Clone)]
pub struct RecordingHandle {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub output_path: PathBuf,
    live: Arc<AtomicBool>,
}

impl RecordingHandle {
    /// A live handle for a recording that starts now.
    pub fn new(session_id: &str, output_path: PathBuf) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: Utc::now(),
            output_path,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Clear the liveness flag. Every clone of the handle observes it.
    pub fn mark_finished(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Video recording tied to a session id
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Start recording. Fails with `AlreadyRecording` while a live handle
    /// exists for the session.
    async fn open(&self, session_id: &str) -> Result<RecordingHandle>;

    /// Finalize the recording behind `handle`. Closing a handle that was
    /// already closed returns `Ok(None)`. On `Timeout` the recording stays
    /// registered and its output is left for `take_finished`.
    async fn close(&self, handle: &RecordingHandle) -> Result<Option<PathBuf>>;

    /// Output of a recording that ended on its own (max duration or end of
    /// stream) or after its close timed out, if one is waiting to be
    /// collected.
    async fn take_finished(&self, session_id: &str) -> Option<PathBuf>;

    async fn is_recording(&self, session_id: &str) -> bool;
}

type Outcome = Result<Option<PathBuf>>;

struct ActiveRecording {
    handle: RecordingHandle,
    cancel: CancellationToken,
    /// `None` while a `close` is waiting on it
    done: Option<oneshot::Receiver<Outcome>>,
}

/// [`Recorder`] writing MJPEG files, optionally converted to MP4 with ffmpeg
pub struct RecordingController {
    config: RecordingConfig,
    source: Arc<dyn StreamSource>,
    ffmpeg: Option<PathBuf>,
    active: Mutex<HashMap<String, ActiveRecording>>,
}

impl RecordingController {
    pub fn new(config: RecordingConfig, source: Arc<dyn StreamSource>) -> Self {
        let ffmpeg = if config.convert_to_mp4 {
            config
                .ffmpeg_path
                .clone()
                .or_else(|| which::which("ffmpeg").ok())
        } else {
            None
        };
        if config.convert_to_mp4 && ffmpeg.is_none() {
            warn!("ffmpeg not found, recordings will be kept as MJPEG");
        }

        Self {
            config,
            source,
            ffmpeg,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn output_path(&self, session_id: &str, started_at: DateTime<Utc>) -> PathBuf {
        self.config.videos_dir.join(format!(
            "video_{}_{}.mjpeg",
            session_id,
            started_at.format("%Y%m%d_%H%M%S_%3f")
        ))
    }

    /// How long `close` waits for the job. Includes the conversion bound
    /// when clips go through ffmpeg.
    fn finalize_budget(&self) -> Duration {
        let mut secs = self.config.finalize_timeout_secs;
        if self.ffmpeg.is_some() {
            secs = secs.saturating_add(self.config.convert_timeout_secs);
        }
        Duration::from_secs(secs)
    }
}

#[async_trait]
impl Recorder for RecordingController {
    async fn open(&self, session_id: &str) -> Result<RecordingHandle> {
        let mut active = self.active.lock().await;
        if let Some(existing) = active.get(session_id) {
            if existing.handle.is_live() {
                return Err(Error::AlreadyRecording(session_id.to_string()));
            }
            // A segment that ended on its own and was never collected.
            if let Some(stale) = active.remove(session_id) {
                debug!(session_id = %session_id, path = %stale.handle.output_path.display(), "Discarding uncollected recording");
            }
        }

        tokio::fs::create_dir_all(&self.config.videos_dir).await?;

        let handle = RecordingHandle::new(session_id, self.output_path(session_id, Utc::now()));
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let job = RecordJob {
            source: self.source.clone(),
            path: handle.output_path.clone(),
            max_duration: Duration::from_secs(self.config.max_duration_secs),
            cancel: cancel.clone(),
            ffmpeg: self.ffmpeg.clone(),
            convert_timeout: Duration::from_secs(self.config.convert_timeout_secs),
        };
        let live = handle.clone();
        let sid = session_id.to_string();
        tokio::spawn(async move {
            let outcome = job.run().await;
            if let Err(e) = &outcome {
                warn!(session_id = %sid, error = %e, "Recording failed");
            }
            live.mark_finished();
            let _ = tx.send(outcome);
        });

        info!(session_id = %session_id, path = %handle.output_path.display(), "Recording started");
        active.insert(
            session_id.to_string(),
            ActiveRecording {
                handle: handle.clone(),
                cancel,
                done: Some(rx),
            },
        );
        Ok(handle)
    }

    async fn close(&self, handle: &RecordingHandle) -> Result<Option<PathBuf>> {
        // The entry stays registered until the job reports back, so the
        // session cannot open a second recording in the meantime.
        let mut done = {
            let mut active = self.active.lock().await;
            match active.get_mut(&handle.session_id) {
                Some(a) if a.handle.output_path == handle.output_path => {
                    a.cancel.cancel();
                    match a.done.take() {
                        Some(done) => done,
                        // Another close is already waiting on it.
                        None => return Ok(None),
                    }
                }
                _ => return Ok(None),
            }
        };

        let budget = self.finalize_budget();
        let waited = tokio::time::timeout(budget, &mut done).await;

        let mut active = self.active.lock().await;
        let entry = active
            .get_mut(&handle.session_id)
            .filter(|a| a.handle.output_path == handle.output_path);
        match waited {
            Ok(received) => {
                if entry.is_some() {
                    active.remove(&handle.session_id);
                }
                let outcome = received
                    .map_err(|_| Error::Other("recording task ended without a result".into()))?;
                if let Ok(Some(path)) = &outcome {
                    info!(session_id = %handle.session_id, path = %path.display(), "Recording finalized");
                }
                outcome
            }
            Err(_) => {
                // Still finalizing: hand the receiver back so a later close or
                // take_finished collects the clip.
                if let Some(entry) = entry {
                    entry.done = Some(done);
                }
                warn!(session_id = %handle.session_id, "Recording did not finalize in time");
                Err(Error::Timeout(budget.as_secs()))
            }
        }
    }

    async fn take_finished(&self, session_id: &str) -> Option<PathBuf> {
        let mut active = self.active.lock().await;
        let entry = active.get_mut(session_id)?;
        if entry.handle.is_live() {
            return None;
        }

        let outcome = match entry.done.as_mut()?.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Ok(outcome) => outcome.ok().flatten(),
            Err(oneshot::error::TryRecvError::Closed) => None,
        };
        active.remove(session_id);
        outcome
    }

    async fn is_recording(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .await
            .get(session_id)
            .is_some_and(|a| a.handle.is_live())
    }
}

struct RecordJob {
    source: Arc<dyn StreamSource>,
    path: PathBuf,
    max_duration: Duration,
    cancel: CancellationToken,
    ffmpeg: Option<PathBuf>,
    convert_timeout: Duration,
}

impl RecordJob {
    async fn run(self) -> Outcome {
        let mut stream = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(None),
            opened = self.source.open() => opened?,
        };

        let mut file = tokio::fs::File::create(&self.path).await?;
        let deadline = tokio::time::sleep(self.max_duration);
        tokio::pin!(deadline);

        let mut frames = 0u64;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = &mut deadline => {
                    debug!(path = %self.path.display(), "Recording reached max duration");
                    break;
                }
                next = stream.next_frame() => match next {
                    Ok(Some(frame)) => {
                        file.write_all(&frame).await?;
                        frames += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Stream read failed, ending recording");
                        break;
                    }
                },
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if frames == 0 {
            let _ = tokio::fs::remove_file(&self.path).await;
            warn!("No video frames captured");
            return Ok(None);
        }
        debug!(frames, path = %self.path.display(), "Recording written");

        match &self.ffmpeg {
            Some(ffmpeg) => Ok(Some(
                convert_to_mp4(ffmpeg, &self.path, self.convert_timeout).await,
            )),
            None => Ok(Some(self.path)),
        }
    }
}

/// Convert `input` to MP4 next to it; the original is removed on success.
/// Returns whichever file holds the recording afterwards.
async fn convert_to_mp4(ffmpeg: &Path, input: &Path, timeout: Duration) -> PathBuf {
    let output = input.with_extension("mp4");
    let run = tokio::process::Command::new(ffmpeg)
        .arg("-y")
        .args(["-f", "mjpeg", "-i"])
        .arg(input)
        .args([
            "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-movflags", "+faststart",
            "-loglevel", "warning",
        ])
        .arg(&output)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(out)) if out.status.success() && output.exists() => {
            let _ = tokio::fs::remove_file(input).await;
            output
        }
        Ok(Ok(out)) => {
            warn!(stderr = %String::from_utf8_lossy(&out.stderr), "Video conversion failed");
            input.to_path_buf()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Could not run ffmpeg");
            input.to_path_buf()
        }
        Err(_) => {
            warn!("Video conversion timed out");
            input.to_path_buf()
        }
    }
}
