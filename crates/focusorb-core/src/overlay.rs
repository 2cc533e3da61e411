//! Actions offered by the intervention panel.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayCommand {
    /// Ask the decision backend, explaining why the user is here
    CheckWithAi { reason: String },
    /// Take a break; `text` is what the user typed, e.g. `break 10 min`
    TakeBreak { text: String },
    CloseNow,
    /// Hide the panel without closing the page
    Dismiss,
}

fn break_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)break\s+(\d+)\s*(min|mins|minute|minutes)?").ok())
        .as_ref()
}

/// Extract the minute count from text like `break 10 minutes`
///
/// Counts too large for an integer still parse; the break length is
/// capped when the grant is applied.
#[must_use]
pub fn parse_break_minutes(text: &str) -> Option<f64> {
    let captures = break_pattern()?.captures(text.trim())?;
    captures.get(1)?.as_str().parse().ok()
}
