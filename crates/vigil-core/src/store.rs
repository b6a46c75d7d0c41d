//! Result store.
//!
//! Append-mostly SQLite table of verdicts. Appends clamp the stored
//! timestamp so that history read in timestamp order matches append order.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{HistoryFilter, MonitoringType, PruneReport, RetentionPolicy, Verdict, VerdictStatus};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS verdicts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id      TEXT    NOT NULL,
    monitoring_type TEXT    NOT NULL,
    status          TEXT    NOT NULL,
    threat_level    INTEGER NOT NULL DEFAULT 0,
    confidence      REAL    NOT NULL DEFAULT 0.0,
    summary         TEXT    NOT NULL,
    action          TEXT,
    raw_text        TEXT    NOT NULL,
    parsed          INTEGER NOT NULL DEFAULT 0,
    timestamp       INTEGER NOT NULL,
    image_path      TEXT,
    video_path      TEXT
);
CREATE INDEX IF NOT EXISTS idx_verdicts_timestamp ON verdicts(timestamp);
CREATE INDEX IF NOT EXISTS idx_verdicts_session ON verdicts(session_id);
CREATE INDEX IF NOT EXISTS idx_verdicts_status ON verdicts(status);
CREATE INDEX IF NOT EXISTS idx_verdicts_threat ON verdicts(threat_level);
";

const COLUMNS: &str = "id, session_id, monitoring_type, status, threat_level, confidence, summary,
                       action, raw_text, parsed, timestamp, image_path, video_path";

/// Durable verdict storage
pub trait ResultStore: Send + Sync {
    /// Append a verdict; returns its id.
    fn append(&self, verdict: &Verdict) -> Result<i64>;

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<Verdict>>;

    fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport>;

    fn count(&self) -> Result<u64>;
}

/// SQLite-backed [`ResultStore`].
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::init(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    fn map_verdict(row: &rusqlite::Row) -> rusqlite::Result<Verdict> {
        let monitoring_type: String = row.get(2)?;
        let status: String = row.get(3)?;
        let threat_level: i64 = row.get(4)?;
        let parsed: i64 = row.get(9)?;
        let timestamp: i64 = row.get(10)?;

        Ok(Verdict {
            id: Some(row.get(0)?),
            session_id: row.get(1)?,
            monitoring_type: monitoring_type
                .parse::<MonitoringType>()
                .map_err(|e| conversion_error(2, e))?,
            status: status.parse::<VerdictStatus>().map_err(|e| conversion_error(3, e))?,
            threat_level: threat_level.clamp(0, 10) as u8,
            confidence: row.get(5)?,
            summary: row.get(6)?,
            action: row.get(7)?,
            raw_text: row.get(8)?,
            parsed: parsed != 0,
            timestamp: DateTime::from_timestamp_millis(timestamp).unwrap_or_default(),
            image_path: row.get(11)?,
            video_path: row.get(12)?,
        })
    }
}

fn media_columns(row: &rusqlite::Row) -> rusqlite::Result<(Option<String>, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn conversion_error(col: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, message.into())
}

impl ResultStore for Database {
    fn append(&self, verdict: &Verdict) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let last: i64 = conn.query_row("SELECT COALESCE(MAX(timestamp), 0) FROM verdicts", [], |r| {
            r.get(0)
        })?;
        let timestamp = verdict.timestamp.timestamp_millis().max(last);

        conn.execute(
            "INSERT INTO verdicts (session_id, monitoring_type, status, threat_level, confidence,
                                   summary, action, raw_text, parsed, timestamp, image_path, video_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                verdict.session_id,
                verdict.monitoring_type.as_str(),
                verdict.status.as_str(),
                verdict.threat_level as i64,
                verdict.confidence,
                verdict.summary,
                verdict.action,
                verdict.raw_text,
                verdict.parsed as i64,
                timestamp,
                verdict.image_path,
                verdict.video_path,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(id, session_id = %verdict.session_id, status = %verdict.status, "Verdict stored");
        Ok(id)
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<Verdict>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(session_id) = &filter.session_id {
            clauses.push("session_id = ?");
            values.push(Value::Text(session_id.clone()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(min) = filter.min_threat_level {
            clauses.push("threat_level >= ?");
            values.push(Value::Integer(min as i64));
        }
        if let Some(since) = filter.since {
            clauses.push("timestamp >= ?");
            values.push(Value::Integer(since.timestamp_millis()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let order = if filter.ascending { "ASC" } else { "DESC" };
        values.push(Value::Integer(filter.effective_limit() as i64));
        values.push(Value::Integer(filter.offset.unwrap_or(0) as i64));

        let sql = format!(
            "SELECT {COLUMNS} FROM verdicts {where_sql}
             ORDER BY timestamp {order}, id {order}
             LIMIT ? OFFSET ?"
        );

        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&sql)?;
        let verdicts = stmt
            .query_map(params_from_iter(values), Self::map_verdict)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(verdicts)
    }

    fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport> {
        // An age or count beyond what the clock or the table can hold means
        // no limit.
        let cutoff = (policy.max_age_days > 0)
            .then(|| ChronoDuration::try_days(i64::from(policy.max_age_days)))
            .flatten()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .map(|t| t.timestamp_millis());
        let max_records = (policy.max_records > 0)
            .then(|| i64::try_from(policy.max_records).ok())
            .flatten();

        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        let mut paths: Vec<String> = Vec::new();
        let mut removed = 0usize;

        if let Some(cutoff) = cutoff {
            let mut stmt =
                tx.prepare("DELETE FROM verdicts WHERE timestamp < ?1 RETURNING image_path, video_path")?;
            for row in stmt.query_map(params![cutoff], media_columns)? {
                let (image, video) = row?;
                removed += 1;
                paths.extend(image.into_iter().chain(video));
            }
        }

        let total: i64 = tx.query_row("SELECT COUNT(*) FROM verdicts", [], |r| r.get(0))?;
        let excess = max_records.map_or(0, |max| total.saturating_sub(max));
        if excess > 0 {
            let mut stmt = tx.prepare(
                "DELETE FROM verdicts WHERE id IN (
                     SELECT id FROM verdicts ORDER BY timestamp ASC, id ASC LIMIT ?1
                 ) RETURNING image_path, video_path",
            )?;
            for row in stmt.query_map(params![excess], media_columns)? {
                let (image, video) = row?;
                removed += 1;
                paths.extend(image.into_iter().chain(video));
            }
        }

        // Keep files that surviving records still point at.
        let mut media_paths = Vec::with_capacity(paths.len());
        {
            let mut still_used = tx.prepare(
                "SELECT EXISTS(SELECT 1 FROM verdicts WHERE image_path = ?1 OR video_path = ?1)",
            )?;
            for path in paths {
                let used: bool = still_used.query_row(params![path], |r| r.get(0))?;
                if !used && !media_paths.contains(&path) {
                    media_paths.push(path);
                }
            }
        }
        tx.commit()?;

        if removed > 0 {
            info!(removed, files = media_paths.len(), "Pruned old verdicts");
        }
        Ok(PruneReport { removed, media_paths })
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM verdicts", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}
