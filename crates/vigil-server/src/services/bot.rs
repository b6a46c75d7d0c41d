//! Telegram command poller
//!
//! Long-polls `getUpdates` and maps chat commands onto the engine entry
//! points, so the bot and the HTTP API drive the same `Monitor`. Only the
//! alert chat and `telegram.authorized_chats` are answered.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use vigil_core::config::TelegramConfig;
use vigil_core::notify::{Notifier, TelegramNotifier, escape_html};
use vigil_core::{
    AnalysisStyle, HistoryFilter, Monitor, MonitoringType, SessionConfig, SessionSnapshot,
};

/// Default interval for `/monitor_start` without arguments
const DEFAULT_INTERVAL_SECS: u64 = 30;
const DEFAULT_HISTORY: usize = 5;
const MAX_HISTORY: usize = 20;
/// Pause after a failed poll
const POLL_BACKOFF: Duration = Duration::from_secs(5);
/// How long shutdown waits for replies still being handled
const REPLY_GRACE: Duration = Duration::from_secs(5);

const HELP_TEXT: &str = "🎥 <b>Vigil Monitoring Bot</b>

<b>Commands</b>
/monitor_start [type] [interval] [style] [instructions…]
    start a session (default: security 30 formal)
/monitor_stop - stop the running session
/status - engine and session status
/history [n] - last n verdicts (default 5)
/capture - take a picture now
/help - this message

<b>Types:</b> security, presence, lighting, classroom, workplace, custom
<b>Styles:</b> formal, technical, casual, security, report";

/// A parsed chat command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Status,
    History(usize),
    Capture,
    MonitorStart(SessionConfig),
    MonitorStop,
    /// Recognised command with unusable arguments
    Usage(String),
    Unknown(String),
}

/// What the bot sends back
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub photo: Option<Bytes>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            photo: None,
        }
    }
}

/// Parse a message into a command. Plain text is ignored.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    // Group chats address commands as /status@botname.
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    let command = match name.as_str() {
        "start" | "help" => Command::Help,
        "status" => Command::Status,
        "capture" => Command::Capture,
        "monitor_stop" => Command::MonitorStop,
        "history" => match args.first() {
            None => Command::History(DEFAULT_HISTORY),
            Some(n) => match n.parse::<usize>() {
                Ok(n) => Command::History(n.clamp(1, MAX_HISTORY)),
                Err(_) => Command::Usage("Usage: /history [n]".into()),
            },
        },
        "monitor_start" => parse_monitor_start(&args),
        _ => Command::Unknown(name),
    };
    Some(command)
}

fn parse_monitor_start(args: &[&str]) -> Command {
    let monitoring_type = args
        .first()
        .copied()
        .unwrap_or(MonitoringType::Security.as_str());
    let interval_secs = match args.get(1) {
        None => DEFAULT_INTERVAL_SECS,
        Some(raw) => match raw.trim_end_matches('s').parse::<u64>() {
            Ok(secs) => secs,
            Err(_) => {
                return Command::Usage(format!(
                    "Interval must be a number of seconds, got <code>{}</code>",
                    escape_html(raw)
                ));
            }
        },
    };
    let style = args
        .get(2)
        .copied()
        .unwrap_or(AnalysisStyle::Formal.as_str());
    let instructions = args.get(3..).map(|rest| rest.join(" ")).filter(|s| !s.is_empty());

    Command::MonitorStart(SessionConfig {
        monitoring_type: monitoring_type.to_string(),
        style: style.to_string(),
        interval_secs,
        custom_instructions: instructions,
    })
}

/// Run `command` against the engine.
pub async fn handle(monitor: &Arc<Monitor>, command: Command) -> Reply {
    match command {
        Command::Help => Reply::text(HELP_TEXT),
        Command::Status => Reply::text(format_status(&monitor.status().await)),
        Command::History(n) => match monitor.history(&HistoryFilter::recent(n)) {
            Ok(verdicts) if verdicts.is_empty() => Reply::text("📭 No verdicts stored yet."),
            Ok(verdicts) => {
                let mut msg = format!("📜 <b>Last {} verdicts</b>\n", verdicts.len());
                for v in &verdicts {
                    msg.push_str(&format!(
                        "\n<code>{}</code> <b>{}</b> {}/10 · {}",
                        v.timestamp.format("%m-%d %H:%M"),
                        v.status,
                        v.threat_level,
                        escape_html(&truncate(&v.summary, 60)),
                    ));
                }
                Reply::text(msg)
            }
            Err(e) => error_reply(&e),
        },
        Command::Capture => match monitor.capture_now().await {
            Ok((frame, _path)) => Reply {
                text: format!(
                    "📸 <b>Capture</b>\n🕒 {}\n📦 {:.1} KB",
                    frame.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    frame.len() as f64 / 1024.0
                ),
                photo: Some(frame.bytes),
            },
            Err(e) => error_reply(&e),
        },
        Command::MonitorStart(config) => match monitor.start(config).await {
            Ok(session_id) => {
                let snapshot = monitor.status().await;
                let mut msg = format!("✅ <b>Monitoring started</b>\n🔗 Session: <code>{session_id}</code>");
                if let Some(session) = snapshot.session {
                    msg.push_str(&format!(
                        "\n📋 {} · {} · every {}s",
                        session.monitoring_type, session.style, session.interval_secs
                    ));
                }
                Reply::text(msg)
            }
            Err(e) => error_reply(&e),
        },
        Command::MonitorStop => match monitor.stop().await {
            Ok(()) => Reply::text("⏹ <b>Monitoring stopped</b>"),
            Err(e) => error_reply(&e),
        },
        Command::Usage(text) => Reply::text(text),
        Command::Unknown(name) => Reply::text(format!(
            "❓ Unknown command /{}. Send /help for the list.",
            escape_html(&name)
        )),
    }
}

fn error_reply(e: &vigil_core::Error) -> Reply {
    Reply::text(format!("❌ {}", escape_html(&e.to_string())))
}

fn format_status(s: &SessionSnapshot) -> String {
    let mut msg = format!("📊 <b>Engine:</b> {}", s.state);

    if let Some(session) = &s.session {
        msg.push_str(&format!(
            "\n🔗 <b>Session:</b> <code>{}</code>\n📋 {} · {} · every {}s\n🕒 Since {}\n🔁 Cycles: {}\n🎥 Recording: {}",
            session.id,
            session.monitoring_type,
            session.style,
            session.interval_secs,
            session.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            s.cycles,
            if s.recording { "yes" } else { "no" },
        ));
    }
    if let Some(v) = &s.last_verdict {
        msg.push_str(&format!(
            "\n\n<b>Last verdict:</b> {} · {}/10 · {:.0}%\n{}",
            v.status,
            v.threat_level,
            v.confidence_percent(),
            escape_html(&truncate(&v.summary, 120)),
        ));
    }
    if let Some(err) = &s.last_error {
        msg.push_str(&format!("\n\n⚠️ {}", escape_html(err)));
    }
    msg
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Answer `command` on its own task. Replies can arrive out of order, so a
/// `/monitor_stop` is not held up by a `/monitor_start` still capturing.
pub fn dispatch(
    tracker: &TaskTracker,
    monitor: &Arc<Monitor>,
    chat: Arc<dyn Notifier>,
    chat_id: String,
    command: Command,
) {
    let monitor = monitor.clone();
    tracker.spawn(async move {
        let reply = handle(&monitor, command).await;
        let sent = match reply.photo {
            Some(photo) => chat.send_photo(&chat_id, photo, &reply.text).await,
            None => chat.send_text(&chat_id, &reply.text, false).await,
        };
        if let Err(e) = sent {
            warn!(chat_id = %chat_id, error = %e, "Bot reply failed");
        }
    });
}

/// Poll for commands until `cancel` fires.
pub async fn run(
    monitor: Arc<Monitor>,
    bot: Arc<TelegramNotifier>,
    config: TelegramConfig,
    cancel: CancellationToken,
) {
    info!("Telegram command poller started");
    let tracker = TaskTracker::new();
    let mut offset = 0i64;

    loop {
        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = bot.get_updates(offset, config.poll_timeout_secs) => result,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Telegram poll failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(POLL_BACKOFF) => continue,
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let chat_id = message.chat.id.to_string();
            let Some(command) = message.text.as_deref().and_then(parse_command) else {
                continue;
            };

            if !config.is_authorized(&chat_id) {
                warn!(chat_id = %chat_id, "Command from unauthorized chat");
                if let Err(e) = bot.send_text(&chat_id, "⛔ Access denied.", false).await {
                    debug!(error = %e, "Could not answer unauthorized chat");
                }
                continue;
            }

            debug!(chat_id = %chat_id, command = ?command, "Bot command");
            dispatch(&tracker, &monitor, bot.clone(), chat_id, command);
        }
    }

    tracker.close();
    if tokio::time::timeout(REPLY_GRACE, tracker.wait()).await.is_err() {
        warn!(pending = tracker.len(), "Bot replies still pending at shutdown");
    }
    info!("Telegram command poller stopped");
}
