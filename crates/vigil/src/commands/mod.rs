//! Command implementations for the vigil CLI.
//!
//! Each submodule implements the logic for one command.

pub mod capture;
pub mod history;
pub mod monitor;
pub mod prune;
pub mod status;

use colored::{ColoredString, Colorize};
use vigil_core::{EngineState, VerdictStatus};

/// Verdict status colored by severity.
pub fn paint_status(status: VerdictStatus) -> ColoredString {
    match status {
        VerdictStatus::Normal => status.as_str().green(),
        VerdictStatus::Warning => status.as_str().yellow().bold(),
        VerdictStatus::Danger => status.as_str().red().bold(),
        VerdictStatus::Unknown => status.as_str().dimmed(),
    }
}

/// Engine state colored for dashboards.
pub fn paint_state(state: EngineState) -> ColoredString {
    let label = state.to_string().to_uppercase();
    match state {
        EngineState::Running => label.green().bold(),
        EngineState::Starting | EngineState::Stopping => label.yellow(),
        EngineState::Idle => label.normal(),
        EngineState::Faulted => label.red().bold(),
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let kept: String = single_line.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_collapses_whitespace() {
        assert_eq!(truncate("a\n  b\tc", 20), "a b c");
    }

    #[test]
    fn test_truncate_marks_cut() {
        let cut = truncate("abcdefghij", 5);
        assert_eq!(cut.chars().count(), 5);
        assert!(cut.ends_with('…'));
    }
}
