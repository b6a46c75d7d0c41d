//! Prompt construction for the reasoning service.

use crate::types::{AnalysisStyle, MonitoringType};

/// Maximum characters of custom instructions embedded in a `custom` prompt
pub const CUSTOM_CONTEXT_LIMIT: usize = 100;
/// Maximum characters of a "Focus:" line on the other monitoring types
pub const FOCUS_LIMIT: usize = 80;

const REPLY_FORMAT: &str = "IMPORTANT: Respond in plain text only. Do not use any formatting like ** or _ or other markdown.

STATUS: [NORMAL/WARNING/DANGER]
CONFIDENCE: [0-100]
THREAT_LEVEL: [0-10]";

const PLAIN_TEXT_REMINDER: &str = "Remember: Use only plain text in your response. No bold, italic, asterisks, underscores, or any markdown formatting.";

struct Role {
    intro: &'static str,
    checks: Option<&'static str>,
    summary: &'static str,
    analysis: &'static str,
    action: &'static str,
}

fn role(monitoring_type: MonitoringType) -> Role {
    match monitoring_type {
        MonitoringType::Security => Role {
            intro: "You are a security guard patrolling this location. Compare the reference image (first) with the current image (second).",
            checks: Some("Look for unauthorized persons, moved or missing items, open doors or windows, suspicious behaviour, equipment changes and lighting tampering."),
            summary: "Security status in one sentence",
            analysis: "Security assessment",
            action: "Security recommendations",
        },
        MonitoringType::Presence => Role {
            intro: "You are a facility supervisor tracking occupancy. Compare the reference image (first) with the current image (second).",
            checks: Some("Look for people entering or leaving, number of occupants, body positions, belongings, seating changes and signs of activity."),
            summary: "Occupancy status in one sentence",
            analysis: "Facility assessment",
            action: "Management recommendations",
        },
        MonitoringType::Lighting => Role {
            intro: "You are an electrical technician checking power and lighting. Compare the reference image (first) with the current image (second).",
            checks: Some("Look for lights switched on or off, brightness changes, shadows, screens, emergency lighting, natural light, indicator lamps and signs of power problems."),
            summary: "Electrical status in one sentence",
            analysis: "Technical assessment",
            action: "Electrical recommendations",
        },
        MonitoringType::Classroom => Role {
            intro: "You are a teacher observing the learning environment. Compare the reference image (first) with the current image (second).",
            checks: Some("Look at attendance and engagement, teacher presence, participation, equipment use, organisation, attention, group work and disruptions."),
            summary: "Classroom status in one sentence",
            analysis: "Educational assessment",
            action: "Teaching recommendations",
        },
        MonitoringType::Workplace => Role {
            intro: "You are a safety officer evaluating workplace conditions. Compare the reference image (first) with the current image (second).",
            checks: Some("Look at employee activity, safety compliance, equipment status, emergency access, organisation, hazards, occupancy and productivity."),
            summary: "Workplace status in one sentence",
            analysis: "Safety assessment",
            action: "Compliance recommendations",
        },
        MonitoringType::Custom => Role {
            intro: "You are a monitoring specialist. Compare the reference image (first) with the current image (second) and describe significant changes.",
            checks: None,
            summary: "Main change in one sentence",
            analysis: "Detailed change description",
            action: "Recommended response",
        },
    }
}

fn style_instruction(style: AnalysisStyle) -> &'static str {
    match style {
        AnalysisStyle::Formal => "Use formal professional language suitable for official reports.",
        AnalysisStyle::Technical => "Give technical detail with measurements and expert terminology.",
        AnalysisStyle::Casual => "Explain like a helpful colleague, in simple terms.",
        AnalysisStyle::Security => "Communicate like experienced security personnel focused on threats.",
        AnalysisStyle::Report => "Present findings like a consultant briefing executives.",
    }
}

/// Build the analysis prompt for one session.
///
/// For `custom` sessions the instructions become the subject of the prompt;
/// for every other type they are appended as a short "Focus:" line.
pub fn build_prompt(
    monitoring_type: MonitoringType,
    style: AnalysisStyle,
    custom_instructions: Option<&str>,
) -> String {
    let instructions = custom_instructions
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let role = role(monitoring_type);

    let mut prompt = String::with_capacity(1024);
    match (monitoring_type, instructions) {
        (MonitoringType::Custom, Some(text)) => {
            prompt.push_str(
                "You are a specialist monitoring professional. Compare the reference image (first) with the current image (second) for these requirements: ",
            );
            prompt.push_str(truncate(text, CUSTOM_CONTEXT_LIMIT));
        }
        _ => {
            prompt.push_str(role.intro);
            if let Some(checks) = role.checks {
                prompt.push_str("\n\n");
                prompt.push_str(checks);
            }
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(REPLY_FORMAT);
    prompt.push_str(&format!(
        "\nSUMMARY: [{}]\nANALYSIS: [{}]\nACTION: [{}]",
        role.summary, role.analysis, role.action
    ));

    prompt.push_str("\n\nStyle: ");
    prompt.push_str(style_instruction(style));

    if monitoring_type != MonitoringType::Custom {
        if let Some(text) = instructions {
            prompt.push_str("\nFocus: ");
            prompt.push_str(truncate(text, FOCUS_LIMIT));
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(PLAIN_TEXT_REMINDER);
    prompt
}

/// First `max` characters of `s`, respecting char boundaries.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
