//! Response interpreter.
//!
//! Turns free-form reasoning-service text into a structured verdict.
//! [`interpret`] is total: whatever the input, it returns an
//! [`Interpretation`] with a threat level in `0..=10` and a confidence in
//! `0.0..=1.0`.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::types::{MonitoringType, Verdict, VerdictStatus};

/// Confidence used when the text states none
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
/// Longest summary kept when no `SUMMARY:` line is present
pub const SUMMARY_MAX_CHARS: usize = 280;

const EMPTY_SUMMARY: &str = "no analysis text";

/// Structured reading of one analysis reply
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub status: VerdictStatus,
    pub threat_level: u8,
    pub confidence: f64,
    pub summary: String,
    pub action: Option<String>,
    /// Status, threat level and confidence were all stated explicitly.
    pub parsed: bool,
    pub raw_text: String,
}

impl Interpretation {
    fn unparsed(raw: &str) -> Self {
        Self {
            status: VerdictStatus::Unknown,
            threat_level: 0,
            confidence: DEFAULT_CONFIDENCE,
            summary: summarize_fallback(raw),
            action: None,
            parsed: false,
            raw_text: raw.to_string(),
        }
    }

    pub fn into_verdict(
        self,
        session_id: &str,
        monitoring_type: MonitoringType,
        timestamp: DateTime<Utc>,
    ) -> Verdict {
        Verdict {
            id: None,
            session_id: session_id.to_string(),
            monitoring_type,
            status: self.status,
            threat_level: self.threat_level,
            confidence: self.confidence,
            summary: self.summary,
            action: self.action,
            raw_text: self.raw_text,
            parsed: self.parsed,
            timestamp,
            image_path: None,
            video_path: None,
        }
    }
}

struct Patterns {
    status_label: Regex,
    danger: Regex,
    warning: Regex,
    normal: Regex,
    threat_after: Regex,
    threat_before: Regex,
    confidence: Regex,
    percentage: Regex,
    summary_line: Regex,
    action_line: Regex,
    label_line: Regex,
    analysis_label: Regex,
    separators: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            status_label: Regex::new(r"(?i)\bstatus\s*[:=\-]?\s*\[?\s*(normal|warning|danger)\b")?,
            danger: Regex::new(r"(?i)\bdanger(?:ous)?\b")?,
            warning: Regex::new(r"(?i)\bwarning\b")?,
            normal: Regex::new(r"(?i)\bnormal\b")?,
            threat_after: Regex::new(
                r"(?i)\b(?:threat[_\s]*level|threat|severity(?:[_\s]*level)?|risk(?:[_\s]*level)?)\s*(?:is|of|at)?\s*[:=]?\s*(-?\d+(?:\.\d+)?)(?:\s*(?:/|out\s+of)\s*10\b)?",
            )?,
            threat_before: Regex::new(
                r"(?i)\b(\d+(?:\.\d+)?)\s*(?:/|out\s+of)\s*10\b[^.\n]{0,30}?\b(?:threat|severity|risk)",
            )?,
            confidence: Regex::new(
                r"(?i)\bconfidence(?:[_\s]*level)?\s*(?:is|of|at)?\s*[:=]?\s*(\d+(?:\.\d+)?)\s*(%)?",
            )?,
            percentage: Regex::new(r"(\d+(?:\.\d+)?)\s*%")?,
            summary_line: Regex::new(r"(?im)^\s*summary\s*:\s*(.+?)\s*$")?,
            action_line: Regex::new(r"(?im)^\s*action\s*:\s*(.+?)\s*$")?,
            label_line: Regex::new(
                r"(?im)^[ \t]*(?:status\s*[:=]\s*\[?\s*\w+\s*\]?|(?:confidence|threat[_\s]*level)\s*[:=]\s*-?[\d.]+\s*%?(?:\s*/\s*10)?|action\s*:.*|simulated response)[ \t]*$",
            )?,
            analysis_label: Regex::new(r"(?i)\banalysis\s*:")?,
            separators: Regex::new(r"(?:\s*[,;]\s*){2,}")?,
        })
    }
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns::compile().ok()).as_ref()
}

/// Interpret raw analysis text. Never fails.
pub fn interpret(raw: &str) -> Interpretation {
    let Some(p) = patterns() else {
        return Interpretation::unparsed(raw);
    };

    // Markdown emphasis and headings get in the way of the label patterns.
    let text: String = raw.chars().filter(|c| !matches!(c, '*' | '#' | '`')).collect();

    let labelled = p
        .status_label
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<VerdictStatus>().ok());
    let status = labelled.or_else(|| {
        if p.danger.is_match(&text) {
            Some(VerdictStatus::Danger)
        } else if p.warning.is_match(&text) {
            Some(VerdictStatus::Warning)
        } else if p.normal.is_match(&text) {
            Some(VerdictStatus::Normal)
        } else {
            None
        }
    });

    let threat = p
        .threat_after
        .captures(&text)
        .or_else(|| p.threat_before.captures(&text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|v| v.round().clamp(0.0, 10.0) as u8);

    let confidence = match p.confidence.captures(&text) {
        Some(c) => c.get(1).and_then(|m| m.as_str().parse::<f64>().ok()).map(|v| {
            if c.get(2).is_some() || v > 1.0 {
                v / 100.0
            } else {
                v
            }
        }),
        None => p
            .percentage
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|v| v / 100.0),
    }
    .map(|v| v.clamp(0.0, 1.0));

    let action = p
        .action_line
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty());

    let summary = match p.summary_line.captures(&text).and_then(|c| c.get(1)) {
        Some(m) if !m.as_str().is_empty() => truncate_chars(m.as_str(), SUMMARY_MAX_CHARS),
        _ => {
            let stripped = p.label_line.replace_all(&text, "");
            let stripped = p.status_label.replace_all(&stripped, "");
            let stripped = p.threat_after.replace_all(&stripped, "");
            let stripped = p.confidence.replace_all(&stripped, "");
            let stripped = p.analysis_label.replace_all(&stripped, "");
            let collapsed = p.separators.replace_all(&stripped, ", ");
            summarize_fallback(&collapsed)
        }
    };

    let parsed = status.is_some() && threat.is_some() && confidence.is_some();
    let status = match (status, threat) {
        (Some(s), Some(_)) => s,
        _ => VerdictStatus::Unknown,
    };

    Interpretation {
        status,
        threat_level: threat.unwrap_or(0),
        confidence: confidence.unwrap_or(DEFAULT_CONFIDENCE),
        summary,
        action,
        parsed,
        raw_text: raw.to_string(),
    }
}

fn summarize_fallback(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '-' | '.') || c.is_whitespace());
    if trimmed.is_empty() {
        EMPTY_SUMMARY.to_string()
    } else {
        truncate_chars(trimmed, SUMMARY_MAX_CHARS)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_danger_report() {
        let i = interpret("Status: DANGER, threat level 8/10, confidence 92%, intruder detected");
        assert_eq!(i.status, VerdictStatus::Danger);
        assert_eq!(i.threat_level, 8);
        assert!((i.confidence - 0.92).abs() < 1e-9);
        assert_eq!(i.summary, "intruder detected");
        assert!(i.parsed);
    }

    #[test]
    fn test_labelled_reply() {
        let raw = "STATUS: WARNING\nCONFIDENCE: 85\nTHREAT_LEVEL: 4\nSUMMARY: A door was left open\nANALYSIS: The rear door is ajar.\nACTION: Close the rear door";
        let i = interpret(raw);
        assert_eq!(i.status, VerdictStatus::Warning);
        assert_eq!(i.threat_level, 4);
        assert!((i.confidence - 0.85).abs() < 1e-9);
        assert_eq!(i.summary, "A door was left open");
        assert_eq!(i.action.as_deref(), Some("Close the rear door"));
        assert_eq!(i.raw_text, raw);
        assert!(i.parsed);
    }

    #[test]
    fn test_markdown_labels() {
        let i = interpret("**STATUS:** NORMAL\n**CONFIDENCE:** 0.7\n**THREAT_LEVEL:** 1\n**SUMMARY:** All quiet");
        assert_eq!(i.status, VerdictStatus::Normal);
        assert_eq!(i.threat_level, 1);
        assert!((i.confidence - 0.7).abs() < 1e-9);
        assert_eq!(i.summary, "All quiet");
    }

    #[test]
    fn test_explicit_label_beats_keywords() {
        let i = interpret("STATUS: NORMAL. No danger observed, threat level 0, confidence 90%");
        assert_eq!(i.status, VerdictStatus::Normal);
    }

    #[test]
    fn test_keyword_priority_without_label() {
        let i = interpret("Normal lighting but a warning sign of danger near the door. Severity: 6. 80% sure");
        assert_eq!(i.status, VerdictStatus::Danger);
        assert_eq!(i.threat_level, 6);
        assert!((i.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_number_before_keyword() {
        let i = interpret("WARNING: 7/10 threat from the open window");
        assert_eq!(i.threat_level, 7);
        assert_eq!(i.status, VerdictStatus::Warning);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let i = interpret("STATUS: DANGER threat level 99 confidence 250%");
        assert_eq!(i.threat_level, 10);
        assert_eq!(i.confidence, 1.0);

        let i = interpret("STATUS: NORMAL threat level -4 confidence: 3");
        assert_eq!(i.threat_level, 0);
        assert!((i.confidence - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_missing_threat_forces_unknown() {
        let i = interpret("STATUS: DANGER confidence 90%");
        assert_eq!(i.status, VerdictStatus::Unknown);
        assert_eq!(i.threat_level, 0);
        assert!(!i.parsed);
    }

    #[test]
    fn test_missing_confidence_defaults_to_neutral() {
        let i = interpret("STATUS: WARNING threat level 5");
        assert_eq!(i.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(i.status, VerdictStatus::Warning);
        assert!(!i.parsed);
    }

    #[test]
    fn test_malformed_inputs_stay_in_range() {
        let long = "9".repeat(400);
        let inputs = [
            "",
            "   \n\t ",
            "no numbers here at all",
            "threat level 1e400",
            "confidence: 99999999999999999999999 threat 12345678901234567890",
            "%%%% //// 10/10",
            "STATUS: [NORMAL/WARNING/DANGER]",
            "日本語のテキスト 危険",
            long.as_str(),
        ];
        for raw in inputs {
            let i = interpret(raw);
            assert!(i.threat_level <= 10, "{raw:?}");
            assert!((0.0..=1.0).contains(&i.confidence), "{raw:?}");
            assert!(!i.summary.is_empty(), "{raw:?}");
            assert_eq!(i.raw_text, raw);
        }
    }

    #[test]
    fn test_empty_text_is_unknown() {
        let i = interpret("");
        assert_eq!(i.status, VerdictStatus::Unknown);
        assert_eq!(i.threat_level, 0);
        assert_eq!(i.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(i.summary, EMPTY_SUMMARY);
        assert!(!i.parsed);
    }

    #[test]
    fn test_long_summary_is_truncated() {
        let raw = format!("STATUS: NORMAL threat 1 {}", "word ".repeat(200));
        let i = interpret(&raw);
        assert!(i.summary.chars().count() <= SUMMARY_MAX_CHARS + 1);
    }

    #[test]
    fn test_into_verdict_carries_fields() {
        let ts = Utc::now();
        let v = interpret("STATUS: DANGER threat 9 confidence 95%").into_verdict("s1", MonitoringType::Security, ts);
        assert_eq!(v.session_id, "s1");
        assert_eq!(v.status, VerdictStatus::Danger);
        assert_eq!(v.threat_level, 9);
        assert_eq!(v.timestamp, ts);
        assert!(v.id.is_none());
    }
}
