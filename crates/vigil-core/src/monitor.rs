//! Monitor - the monitoring orchestration engine
//!
//! Owns at most one monitoring session and drives its cycle on a
//! background task:
//!
//! capture → analyze → interpret → store → notify, with a recording running
//! alongside.
//!
//! All front ends (HTTP API, chat bot, CLI via the API) go through the entry
//! points on [`Monitor`]. Session state sits behind one async mutex that is
//! held only around state transitions, never across collaborator I/O, so
//! `stop()` and `status()` are answered while a cycle waits on the network.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisRequest, Analyzer};
use crate::capture::{CameraHealth, Frame, FrameSource};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::interpreter::interpret;
use crate::media::{self, MediaStore};
use crate::notify::{NotificationEnvelope, Notifier};
use crate::prompt::build_prompt;
use crate::recording::{Recorder, RecordingHandle};
use crate::retry::retry;
use crate::store::ResultStore;
use crate::types::{
    AnalysisStyle, EngineState, HistoryFilter, MonitoringType, PruneReport, RetentionPolicy,
    Session, SessionConfig, SessionId, SessionSnapshot, Verdict,
};

/// Summary stored when no frame could be captured.
pub const CAPTURE_UNAVAILABLE: &str = "capture unavailable";
/// Summary stored when the reasoning service never answered.
pub const ANALYSIS_UNAVAILABLE: &str = "analysis unavailable";

/// Everything the engine talks to
pub struct Collaborators {
    pub frames: Arc<dyn FrameSource>,
    /// `None` disables recording.
    pub recorder: Option<Arc<dyn Recorder>>,
    pub analyzer: Arc<dyn Analyzer>,
    pub store: Arc<dyn ResultStore>,
    /// `None` disables alerts.
    pub notifier: Option<Arc<dyn Notifier>>,
    pub media: MediaStore,
}

/// Session state guarded by the transition lock
struct EngineInner {
    state: EngineState,
    session: Option<Session>,
    cycles: u64,
    last_verdict: Option<Verdict>,
    last_error: Option<String>,
    fault: Option<String>,
    cancel: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

impl EngineInner {
    fn new() -> Self {
        Self {
            state: EngineState::Idle,
            session: None,
            cycles: 0,
            last_verdict: None,
            last_error: None,
            fault: None,
            cancel: None,
            worker: None,
        }
    }

    fn active_session_id(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.id.clone())
            .unwrap_or_default()
    }

    fn clear_session(&mut self) {
        self.state = EngineState::Idle;
        self.session = None;
        self.cancel = None;
        self.worker = None;
    }
}

/// Monitoring orchestration engine
pub struct Monitor {
    collab: Collaborators,
    config: EngineConfig,
    inner: Mutex<EngineInner>,
}

impl Monitor {
    pub fn new(collab: Collaborators, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            collab,
            config,
            inner: Mutex::new(EngineInner::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a session.
    ///
    /// Returns once the baseline frame is captured and the worker runs. A
    /// baseline that cannot be captured after retries leaves the engine
    /// Faulted and surfaces `CaptureUnavailable`.
    pub async fn start(self: &Arc<Self>, config: SessionConfig) -> Result<SessionId> {
        let (mut session, cancel) = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                EngineState::Faulted => {
                    return Err(Error::EngineFaulted(
                        inner.fault.clone().unwrap_or_else(|| "unknown fault".into()),
                    ));
                }
                EngineState::Starting | EngineState::Running | EngineState::Stopping => {
                    return Err(Error::SessionAlreadyActive {
                        session_id: inner.active_session_id(),
                    });
                }
                EngineState::Idle => {}
            }

            let session = self.validate(&config)?;
            let cancel = CancellationToken::new();
            inner.state = EngineState::Starting;
            inner.session = Some(session.clone());
            inner.cycles = 0;
            inner.last_verdict = None;
            inner.last_error = None;
            inner.cancel = Some(cancel.clone());
            (session, cancel)
        };

        info!(
            session_id = %session.id,
            monitoring_type = %session.monitoring_type,
            style = %session.style,
            interval_secs = session.interval_secs,
            "Starting monitoring session"
        );

        let baseline = match retry(
            &self.config.capture_retry,
            "baseline capture",
            Some(&cancel),
            || self.collab.frames.capture(),
        )
        .await
        {
            Ok(frame) => frame,
            Err(e) => {
                let mut inner = self.inner.lock().await;
                if cancel.is_cancelled() {
                    inner.clear_session();
                    info!(session_id = %session.id, "Session stopped before baseline capture");
                    return Err(Error::NotRunning);
                }
                let message = format!("baseline capture failed: {e}");
                error!(session_id = %session.id, error = %e, "Baseline capture failed");
                inner.state = EngineState::Faulted;
                inner.cancel = None;
                inner.fault = Some(message.clone());
                inner.last_error = Some(message.clone());
                return Err(Error::CaptureUnavailable(message));
            }
        };

        session.baseline_path = match self.collab.media.save_baseline(&session.id, &baseline).await {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Could not save baseline image");
                None
            }
        };

        let mut inner = self.inner.lock().await;
        if cancel.is_cancelled() {
            inner.clear_session();
            info!(session_id = %session.id, "Session stopped before it was running");
            return Err(Error::NotRunning);
        }

        let worker = tokio::spawn(Arc::clone(self).run(session.clone(), baseline, cancel));
        inner.state = EngineState::Running;
        inner.session = Some(session.clone());
        inner.worker = Some(worker);

        info!(session_id = %session.id, "Monitoring session running");
        Ok(session.id)
    }

    /// Stop the running session and wait for the worker to wind down.
    pub async fn stop(&self) -> Result<()> {
        let (session_id, worker) = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                EngineState::Running => {
                    inner.state = EngineState::Stopping;
                    if let Some(cancel) = &inner.cancel {
                        cancel.cancel();
                    }
                    (inner.active_session_id(), inner.worker.take())
                }
                EngineState::Starting => {
                    // start() observes the token and unwinds to Idle itself.
                    if let Some(cancel) = &inner.cancel {
                        cancel.cancel();
                    }
                    return Ok(());
                }
                EngineState::Stopping => return Ok(()),
                EngineState::Idle | EngineState::Faulted => return Err(Error::NotRunning),
            }
        };

        info!(session_id = %session_id, "Stopping monitoring session");

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(session_id = %session_id, error = %e, "Monitoring worker panicked");
            }
        }

        // A worker that panicked never reached its own cleanup.
        let mut inner = self.inner.lock().await;
        if inner.state == EngineState::Stopping {
            inner.clear_session();
        }
        Ok(())
    }

    /// Leave the Faulted state. A no-op when Idle.
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            EngineState::Faulted => {
                info!(fault = ?inner.fault, "Engine reset");
                inner.clear_session();
                inner.fault = None;
                inner.last_error = None;
                Ok(())
            }
            EngineState::Idle => Ok(()),
            _ => Err(Error::SessionAlreadyActive {
                session_id: inner.active_session_id(),
            }),
        }
    }

    pub async fn status(&self) -> SessionSnapshot {
        let mut snapshot = {
            let inner = self.inner.lock().await;
            SessionSnapshot {
                state: inner.state,
                session: inner.session.clone(),
                cycles: inner.cycles,
                last_verdict: inner.last_verdict.clone(),
                last_error: inner.last_error.clone(),
                recording: false,
            }
        };

        if let (Some(recorder), Some(session)) = (&self.collab.recorder, &snapshot.session) {
            snapshot.recording = recorder.is_recording(&session.id).await;
        }
        snapshot
    }

    /// Stored verdicts. Answered in every state, Faulted included.
    pub fn history(&self, filter: &HistoryFilter) -> Result<Vec<Verdict>> {
        self.collab.store.list(filter)
    }

    pub fn record_count(&self) -> Result<u64> {
        self.collab.store.count()
    }

    /// Capture and save one frame outside the session cycle.
    pub async fn capture_now(&self) -> Result<(Frame, PathBuf)> {
        let frame = retry(&self.config.capture_retry, "capture", None, || {
            self.collab.frames.capture()
        })
        .await?;
        let path = self.collab.media.save_capture(&frame).await?;
        info!(path = %path.display(), bytes = frame.len(), "On-demand capture saved");
        Ok((frame, path))
    }

    pub async fn camera_health(&self) -> Result<CameraHealth> {
        self.collab.frames.health().await
    }

    /// Apply `policy` to the result store and delete media files that only
    /// the removed records referenced.
    pub async fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport> {
        let report = self.collab.store.prune(policy)?;
        let files = media::remove_files(&report.media_paths).await;
        info!(removed = report.removed, files, "Retention pass complete");
        Ok(report)
    }

    /// Stop the session if one is active. Used on process exit.
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(()) | Err(Error::NotRunning) => {}
            Err(e) => warn!(error = %e, "Shutdown stop failed"),
        }
    }

    fn validate(&self, config: &SessionConfig) -> Result<Session> {
        let monitoring_type = config
            .monitoring_type
            .parse::<MonitoringType>()
            .map_err(Error::InvalidConfig)?;
        let style = config
            .style
            .parse::<AnalysisStyle>()
            .map_err(Error::InvalidConfig)?;

        let min = self.config.min_interval_secs.max(1);
        let max = self.config.max_interval_secs;
        if config.interval_secs < min || config.interval_secs > max {
            return Err(Error::InvalidConfig(format!(
                "interval must be between {} and {} seconds, got {}",
                min, max, config.interval_secs
            )));
        }

        let custom_instructions = config
            .custom_instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Session {
            id: Uuid::new_v4().simple().to_string()[..12].to_string(),
            monitoring_type,
            style,
            interval_secs: config.interval_secs,
            custom_instructions,
            started_at: Utc::now(),
            baseline_path: None,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Worker
    // ─────────────────────────────────────────────────────────────────────────

    async fn run(self: Arc<Self>, session: Session, baseline: Frame, cancel: CancellationToken) {
        let prompt = build_prompt(
            session.monitoring_type,
            session.style,
            session.custom_instructions.as_deref(),
        );
        let mut recording: Option<RecordingHandle> = None;
        let mut ticker = interval(Duration::from_secs(session.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            if let Err(e) = self
                .cycle(&session, &baseline, &prompt, &mut recording, &cancel)
                .await
            {
                break Err(e);
            }
        };

        if let Some(handle) = recording.take() {
            self.finalize_recording(&session, &handle).await;
        }
        if let Some(recorder) = &self.collab.recorder {
            if let Some(path) = recorder.take_finished(&session.id).await {
                debug!(session_id = %session.id, path = %path.display(), "Uncollected segment left on disk");
            }
        }

        let mut inner = self.inner.lock().await;
        match outcome {
            Ok(()) => {
                info!(session_id = %session.id, cycles = inner.cycles, "Monitoring session stopped");
                inner.clear_session();
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Monitoring session faulted");
                cancel.cancel();
                inner.state = EngineState::Faulted;
                inner.cancel = None;
                inner.worker = None;
                inner.fault = Some(e.to_string());
                inner.last_error = Some(e.to_string());
            }
        }
    }

    /// One capture → analyze → interpret → store → notify pass.
    ///
    /// Only a result store failure is returned; every other failure becomes
    /// a degraded verdict.
    async fn cycle(
        &self,
        session: &Session,
        baseline: &Frame,
        prompt: &str,
        recording: &mut Option<RecordingHandle>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let cycle = {
            let mut inner = self.inner.lock().await;
            inner.cycles += 1;
            inner.cycles
        };
        debug!(session_id = %session.id, cycle, "Cycle started");

        let captured = retry(&self.config.capture_retry, "capture", Some(cancel), || {
            self.collab.frames.capture()
        })
        .await;

        // Safe point: a stop requested during capture ends the session here,
        // before a new recording is opened.
        if cancel.is_cancelled() {
            return Ok(());
        }

        let (mut verdict, degraded) = match captured {
            Ok(frame) => {
                let finished = self.maintain_recording(session, recording).await;
                let (mut verdict, degraded) =
                    self.analyze(session, baseline, &frame, prompt, cancel).await;

                verdict.image_path = match self.collab.media.save_current(&session.id, &frame).await {
                    Ok(path) => Some(path.to_string_lossy().into_owned()),
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "Could not save current image");
                        None
                    }
                };
                verdict.video_path = self
                    .escalation_clip(session, &verdict, recording)
                    .await
                    .or(finished)
                    .map(|p| p.to_string_lossy().into_owned());
                (verdict, degraded)
            }
            Err(e) => {
                warn!(session_id = %session.id, cycle, error = %e, "Capture failed after retries");
                (
                    Verdict::unavailable(
                        &session.id,
                        session.monitoring_type,
                        CAPTURE_UNAVAILABLE,
                        Utc::now(),
                    ),
                    Some(format!("{CAPTURE_UNAVAILABLE}: {e}")),
                )
            }
        };

        let id = match self.collab.store.append(&verdict) {
            Ok(id) => id,
            Err(e @ Error::StoreFailure(_)) => return Err(e),
            Err(e) => return Err(Error::StoreFailure(e.to_string())),
        };
        verdict.id = Some(id);

        info!(
            session_id = %session.id,
            cycle,
            status = %verdict.status,
            threat_level = verdict.threat_level,
            confidence = verdict.confidence,
            "Cycle complete"
        );

        {
            let mut inner = self.inner.lock().await;
            inner.last_verdict = Some(verdict.clone());
            inner.last_error = degraded;
        }

        self.notify(&verdict).await;
        Ok(())
    }

    /// Keep one recording live for the session. Returns the output of a
    /// segment that ended on its own, or finished after its close timed
    /// out, since the last cycle.
    async fn maintain_recording(
        &self,
        session: &Session,
        recording: &mut Option<RecordingHandle>,
    ) -> Option<PathBuf> {
        let recorder = self.collab.recorder.as_ref()?;

        if recording.as_ref().is_some_and(|h| !h.is_live()) {
            *recording = None;
        }
        if recording.is_some() {
            return None;
        }

        // Also collects a clip whose close timed out on an earlier cycle.
        let finished = recorder.take_finished(&session.id).await;
        match recorder.open(&session.id).await {
            Ok(handle) => *recording = Some(handle),
            Err(Error::AlreadyRecording(_)) => {
                debug!(session_id = %session.id, "Previous recording still finalizing")
            }
            Err(e) => warn!(session_id = %session.id, error = %e, "Could not open recording"),
        }
        finished
    }

    async fn analyze(
        &self,
        session: &Session,
        baseline: &Frame,
        frame: &Frame,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> (Verdict, Option<String>) {
        let request = AnalysisRequest {
            baseline: baseline.bytes.clone(),
            current: frame.bytes.clone(),
            prompt: prompt.to_string(),
        };

        match retry(&self.config.analysis_retry, "analysis", Some(cancel), || {
            self.collab.analyzer.analyze(&request)
        })
        .await
        {
            Ok(raw) => {
                let interpretation = interpret(&raw);
                if !interpretation.parsed {
                    debug!(session_id = %session.id, "Analysis reply only partially parsed");
                }
                (
                    interpretation.into_verdict(&session.id, session.monitoring_type, Utc::now()),
                    None,
                )
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Analysis failed after retries");
                (
                    Verdict::unavailable(
                        &session.id,
                        session.monitoring_type,
                        ANALYSIS_UNAVAILABLE,
                        Utc::now(),
                    ),
                    Some(format!("{ANALYSIS_UNAVAILABLE}: {e}")),
                )
            }
        }
    }

    /// Cut the live recording when `verdict` reaches the video threshold so
    /// the clip can travel with the alert. The next cycle opens a new one.
    async fn escalation_clip(
        &self,
        session: &Session,
        verdict: &Verdict,
        recording: &mut Option<RecordingHandle>,
    ) -> Option<PathBuf> {
        if verdict.threat_level < self.config.policy.video_threat_threshold {
            return None;
        }
        let recorder = self.collab.recorder.as_ref()?;
        let handle = recording.take()?;

        match recorder.close(&handle).await {
            Ok(path) => {
                if let Some(path) = &path {
                    info!(
                        session_id = %session.id,
                        threat_level = verdict.threat_level,
                        path = %path.display(),
                        "Escalation clip finalized"
                    );
                }
                path
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Could not finalize escalation clip");
                None
            }
        }
    }

    async fn finalize_recording(&self, session: &Session, handle: &RecordingHandle) {
        let Some(recorder) = &self.collab.recorder else {
            return;
        };
        match recorder.close(handle).await {
            Ok(Some(path)) => {
                info!(session_id = %session.id, path = %path.display(), "Recording finalized")
            }
            Ok(None) => {}
            Err(e) => warn!(session_id = %session.id, error = %e, "Recording finalize failed"),
        }
    }

    async fn notify(&self, verdict: &Verdict) {
        let Some(notifier) = &self.collab.notifier else {
            return;
        };
        let Some(envelope) = NotificationEnvelope::for_verdict(verdict, &self.config.policy) else {
            debug!(
                session_id = %verdict.session_id,
                status = %verdict.status,
                threat_level = verdict.threat_level,
                "Notification suppressed"
            );
            return;
        };

        let limit = Duration::from_secs(self.config.notify_timeout_secs);
        match tokio::time::timeout(limit, notifier.deliver(&envelope)).await {
            Ok(Ok(())) => debug!(session_id = %verdict.session_id, "Notification delivered"),
            Ok(Err(e)) => {
                warn!(session_id = %verdict.session_id, error = %e, "Notification delivery failed")
            }
            Err(_) => warn!(
                session_id = %verdict.session_id,
                timeout_secs = self.config.notify_timeout_secs,
                "Notification delivery timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_jpeg;
    use crate::retry::RetryPolicy;
    use crate::store::Database;
    use crate::types::VerdictStatus;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    const DANGER_REPLY: &str =
        "Status: DANGER, threat level 8/10, confidence 92%, intruder detected";
    const NORMAL_REPLY: &str = "STATUS: NORMAL\nCONFIDENCE: 90%\nTHREAT_LEVEL: 1\nSUMMARY: empty room";

    // ─────────────────────────────────────────────────────────────────────────
    // Fakes
    // ─────────────────────────────────────────────────────────────────────────

    struct FakeCamera {
        calls: AtomicUsize,
        /// Captures from this index on fail.
        fail_from: usize,
    }

    impl FakeCamera {
        fn healthy() -> Self {
            Self::failing_from(usize::MAX)
        }

        fn failing_from(fail_from: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from,
            }
        }
    }

    #[async_trait]
    impl FrameSource for FakeCamera {
        async fn capture(&self) -> Result<Frame> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_from {
                return Err(Error::CaptureUnavailable("connection refused".into()));
            }
            Frame::from_jpeg(Bytes::from(test_jpeg(1500, 7)), 1000)
        }

        async fn health(&self) -> Result<CameraHealth> {
            Ok(CameraHealth {
                reachable: true,
                details: serde_json::json!({ "status": "ok" }),
            })
        }
    }

    #[derive(Default)]
    struct FakeRecorder {
        opens: AtomicUsize,
        closes: AtomicUsize,
        live: StdMutex<Option<RecordingHandle>>,
        /// Close times out and the clip lands later.
        slow_close: AtomicBool,
        late: StdMutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl Recorder for FakeRecorder {
        async fn open(&self, session_id: &str) -> Result<RecordingHandle> {
            let mut live = self.live.lock().unwrap();
            if live.as_ref().is_some_and(|h| h.is_live()) {
                return Err(Error::AlreadyRecording(session_id.to_string()));
            }
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            let handle = RecordingHandle::new(session_id, PathBuf::from(format!("clip{n}.mjpeg")));
            *live = Some(handle.clone());
            Ok(handle)
        }

        async fn close(&self, handle: &RecordingHandle) -> Result<Option<PathBuf>> {
            let mut live = self.live.lock().unwrap();
            match live.take() {
                Some(h) if h.output_path == handle.output_path && h.is_live() => {
                    h.mark_finished();
                    self.closes.fetch_add(1, Ordering::SeqCst);
                    if self.slow_close.load(Ordering::SeqCst) {
                        *self.late.lock().unwrap() = Some(h.output_path);
                        return Err(Error::Timeout(1));
                    }
                    Ok(Some(h.output_path))
                }
                other => {
                    *live = other;
                    Ok(None)
                }
            }
        }

        async fn take_finished(&self, _session_id: &str) -> Option<PathBuf> {
            self.late.lock().unwrap().take()
        }

        async fn is_recording(&self, _session_id: &str) -> bool {
            self.live
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|h| h.is_live())
        }
    }

    struct FakeAnalyzer {
        reply: String,
        fail: bool,
    }

    #[async_trait]
    impl Analyzer for FakeAnalyzer {
        async fn analyze(&self, request: &AnalysisRequest) -> Result<String> {
            assert!(!request.baseline.is_empty() && !request.prompt.is_empty());
            if self.fail {
                return Err(Error::AnalysisUnavailable("upstream 503".into()));
            }
            Ok(self.reply.clone())
        }
    }

    struct TestStore {
        db: Database,
        fail: AtomicBool,
    }

    impl ResultStore for TestStore {
        fn append(&self, verdict: &Verdict) -> Result<i64> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::StoreFailure("disk full".into()));
            }
            self.db.append(verdict)
        }

        fn list(&self, filter: &HistoryFilter) -> Result<Vec<Verdict>> {
            self.db.list(filter)
        }

        fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport> {
            self.db.prune(policy)
        }

        fn count(&self) -> Result<u64> {
            self.db.count()
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: StdMutex<Vec<NotificationEnvelope>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn deliver(&self, envelope: &NotificationEnvelope) -> Result<()> {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        async fn send_text(&self, _chat_id: &str, _text: &str, _silent: bool) -> Result<()> {
            Ok(())
        }

        async fn send_photo(&self, _chat_id: &str, _photo: Bytes, _caption: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        monitor: Arc<Monitor>,
        recorder: Arc<FakeRecorder>,
        store: Arc<TestStore>,
        notifier: Arc<FakeNotifier>,
        dir: TempDir,
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            attempt_timeout_secs: 2,
        }
    }

    fn harness(camera: FakeCamera, analyzer: FakeAnalyzer) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(FakeRecorder::default());
        let store = Arc::new(TestStore {
            db: Database::open_in_memory().unwrap(),
            fail: AtomicBool::new(false),
        });
        let notifier = Arc::new(FakeNotifier::default());

        let config = EngineConfig {
            capture_retry: fast_retry(),
            analysis_retry: fast_retry(),
            min_interval_secs: 1,
            ..Default::default()
        };
        let monitor = Monitor::new(
            Collaborators {
                frames: Arc::new(camera),
                recorder: Some(recorder.clone()),
                analyzer: Arc::new(analyzer),
                store: store.clone(),
                notifier: Some(notifier.clone()),
                media: MediaStore::new(dir.path().join("images")),
            },
            config,
        );

        Harness {
            monitor,
            recorder,
            store,
            notifier,
            dir,
        }
    }

    fn replying(reply: &str) -> FakeAnalyzer {
        FakeAnalyzer {
            reply: reply.to_string(),
            fail: false,
        }
    }

    fn security(interval_secs: u64) -> SessionConfig {
        SessionConfig::new(MonitoringType::Security, AnalysisStyle::Formal, interval_secs)
    }

    /// Wait until `n` verdicts are stored and the snapshot caught up.
    async fn wait_for_records(h: &Harness, n: u64) {
        for _ in 0..500 {
            if h.store.count().unwrap() >= n && h.monitor.status().await.last_verdict.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} stored verdicts");
    }

    async fn wait_for_state(monitor: &Monitor, state: EngineState) {
        for _ in 0..500 {
            if monitor.status().await.state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine never reached {state}");
    }

    fn latest(store: &TestStore) -> Verdict {
        store.list(&HistoryFilter::recent(1)).unwrap().remove(0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_second_start_reports_active_session() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));

        let id = h.monitor.start(security(30)).await.unwrap();
        let err = h.monitor.start(security(30)).await.unwrap_err();
        match err {
            Error::SessionAlreadyActive { session_id } => assert_eq!(session_id, id),
            other => panic!("unexpected error: {other}"),
        }

        h.monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_leaves_engine_idle() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));

        let mut unknown_type = security(30);
        unknown_type.monitoring_type = "parking".into();
        let mut unknown_style = security(30);
        unknown_style.style = "poetic".into();

        for config in [security(0), security(100_000), unknown_type, unknown_style] {
            let err = h.monitor.start(config).await.unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
            assert_eq!(h.monitor.status().await.state, EngineState::Idle);
        }
    }

    #[tokio::test]
    async fn test_danger_verdict_is_stored_and_escalated_with_video() {
        let h = harness(FakeCamera::healthy(), replying(DANGER_REPLY));

        h.monitor.start(security(5)).await.unwrap();
        wait_for_records(&h, 1).await;

        let verdict = latest(&h.store);
        assert_eq!(verdict.status, VerdictStatus::Danger);
        assert_eq!(verdict.threat_level, 8);
        assert!((verdict.confidence - 0.92).abs() < 1e-9);
        assert!(verdict.image_path.is_some());
        assert_eq!(verdict.video_path.as_deref(), Some("clip0.mjpeg"));

        // Delivery follows the append.
        for _ in 0..200 {
            if !h.notifier.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        {
            let sent = h.notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert!(sent[0].text.contains("DANGER"));
            assert_eq!(sent[0].video, Some(PathBuf::from("clip0.mjpeg")));
            assert!(sent[0].image.is_some());
            assert!(!sent[0].silent);
        }

        h.monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_failure_keeps_session_running() {
        // Baseline succeeds; every cycle capture fails.
        let h = harness(FakeCamera::failing_from(1), replying(DANGER_REPLY));

        h.monitor.start(security(5)).await.unwrap();
        wait_for_records(&h, 1).await;

        let verdict = latest(&h.store);
        assert_eq!(verdict.status, VerdictStatus::Unknown);
        assert_eq!(verdict.threat_level, 0);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.summary, CAPTURE_UNAVAILABLE);

        let status = h.monitor.status().await;
        assert_eq!(status.state, EngineState::Running);
        assert!(status.last_error.unwrap().starts_with(CAPTURE_UNAVAILABLE));
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert_eq!(h.recorder.opens.load(Ordering::SeqCst), 0);

        h.monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_analysis_failure_yields_unknown_verdict() {
        let analyzer = FakeAnalyzer {
            reply: String::new(),
            fail: true,
        };
        let h = harness(FakeCamera::healthy(), analyzer);

        h.monitor.start(security(5)).await.unwrap();
        wait_for_records(&h, 1).await;

        let verdict = latest(&h.store);
        assert_eq!(verdict.status, VerdictStatus::Unknown);
        assert_eq!(verdict.summary, ANALYSIS_UNAVAILABLE);
        assert!(verdict.image_path.is_some());
        assert_eq!(h.monitor.status().await.state, EngineState::Running);

        h.monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_clip_finalized_after_close_timeout_lands_on_next_verdict() {
        let h = harness(FakeCamera::healthy(), replying(DANGER_REPLY));
        h.recorder.slow_close.store(true, Ordering::SeqCst);

        h.monitor.start(security(1)).await.unwrap();
        wait_for_records(&h, 2).await;
        h.monitor.stop().await.unwrap();

        let filter = HistoryFilter {
            ascending: true,
            ..Default::default()
        };
        let history = h.monitor.history(&filter).unwrap();
        assert!(history.len() >= 2);
        assert!(history[0].video_path.is_none());
        assert_eq!(history[1].video_path.as_deref(), Some("clip0.mjpeg"));
        assert!(h.recorder.opens.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_stop_during_sleep_closes_recording_once() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));

        h.monitor.start(security(60)).await.unwrap();
        wait_for_records(&h, 1).await;
        assert!(h.monitor.status().await.recording);

        tokio::time::timeout(Duration::from_secs(2), h.monitor.stop())
            .await
            .expect("stop blocked behind the interval")
            .unwrap();

        let status = h.monitor.status().await;
        assert_eq!(status.state, EngineState::Idle);
        assert!(status.session.is_none());
        assert_eq!(h.recorder.opens.load(Ordering::SeqCst), 1);
        assert_eq!(h.recorder.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(h.monitor.stop().await, Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn test_store_failure_faults_engine_but_history_stays_readable() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));
        let earlier = Verdict::unavailable("old", MonitoringType::Security, "earlier", Utc::now());
        h.store.append(&earlier).unwrap();
        h.store.fail.store(true, Ordering::SeqCst);

        h.monitor.start(security(5)).await.unwrap();
        wait_for_state(&h.monitor, EngineState::Faulted).await;

        let err = h.monitor.start(security(5)).await.unwrap_err();
        assert!(matches!(err, Error::EngineFaulted(_)), "{err}");

        let history = h.monitor.history(&HistoryFilter::default()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].summary, "earlier");
        assert_eq!(h.recorder.closes.load(Ordering::SeqCst), 1);
        assert!(h.monitor.status().await.last_error.unwrap().contains("disk full"));

        h.store.fail.store(false, Ordering::SeqCst);
        h.monitor.reset().await.unwrap();
        h.monitor.start(security(5)).await.unwrap();
        h.monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_baseline_failure_faults_engine() {
        let h = harness(FakeCamera::failing_from(0), replying(NORMAL_REPLY));

        let err = h.monitor.start(security(5)).await.unwrap_err();
        assert!(matches!(err, Error::CaptureUnavailable(_)), "{err}");
        assert_eq!(h.monitor.status().await.state, EngineState::Faulted);
        assert!(matches!(
            h.monitor.start(security(5)).await,
            Err(Error::EngineFaulted(_))
        ));

        h.monitor.reset().await.unwrap();
        assert_eq!(h.monitor.status().await.state, EngineState::Idle);
    }

    #[tokio::test]
    async fn test_cycles_append_in_timestamp_order() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));

        let id = h.monitor.start(security(1)).await.unwrap();
        wait_for_records(&h, 3).await;
        h.monitor.stop().await.unwrap();

        let filter = HistoryFilter {
            session_id: Some(id),
            ascending: true,
            ..Default::default()
        };
        let history = h.monitor.history(&filter).unwrap();
        assert!(history.len() >= 3);
        for pair in history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
            assert!(pair[0].id < pair[1].id);
        }
        // Low-threat cycles keep a single recording alive.
        assert_eq!(h.recorder.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capture_now_saves_frame() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));

        let (frame, path) = h.monitor.capture_now().await.unwrap();
        assert_eq!(frame.len(), 1500);
        assert!(path.starts_with(h.dir.path()));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_prune_deletes_media_of_removed_records() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));
        let image = h.dir.path().join("old.jpg");
        std::fs::write(&image, b"jpeg").unwrap();

        let mut old = Verdict::unavailable(
            "s1",
            MonitoringType::Security,
            "old",
            Utc::now() - chrono::Duration::days(40),
        );
        old.image_path = Some(image.to_string_lossy().into_owned());
        h.store.append(&old).unwrap();

        let report = h
            .monitor
            .prune(&RetentionPolicy {
                max_records: 0,
                max_age_days: 30,
            })
            .await
            .unwrap();
        assert_eq!(report.removed, 1);
        assert!(!image.exists());
        assert_eq!(h.monitor.record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_rejected_while_running() {
        let h = harness(FakeCamera::healthy(), replying(NORMAL_REPLY));
        h.monitor.start(security(30)).await.unwrap();

        assert!(matches!(
            h.monitor.reset().await,
            Err(Error::SessionAlreadyActive { .. })
        ));

        h.monitor.shutdown().await;
        assert_eq!(h.monitor.status().await.state, EngineState::Idle);
    }
}
