use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Store keys, as they appear in the persisted mapping
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const YOUTUBE_ENABLED: &str = "youtubeEnabled";
    pub const BLOCKLIST: &str = "blocklist";
    pub const SHOW_AFTER_SECONDS: &str = "showAfterSeconds";
    pub const BREAK_UNTIL: &str = "breakUntil";
    pub const BREAK_HOST: &str = "breakHost";
    pub const BREAK_REASON: &str = "breakReason";
    pub const FOCUS_TOPIC: &str = "focusTopic";
    pub const FOCUS_SINCE: &str = "focusSince";
    pub const LAST_DECISION: &str = "lastDecision";
}

/// Most recent verdict returned by the decision backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastDecision {
    /// Epoch milliseconds
    pub at: u64,
    pub input: Value,
    pub output: Value,
}

/// Persisted settings singleton
///
/// Missing keys deserialize to their defaults, so a partially seeded store
/// still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    /// Watch-route monitoring for video pages
    pub youtube_enabled: bool,
    pub blocklist: BTreeSet<String>,
    /// Continuous playback required before the overlay appears; fractional
    /// values are allowed
    pub show_after_seconds: f64,
    /// Epoch milliseconds, 0 when no break was granted
    pub break_until: u64,
    pub break_host: String,
    pub break_reason: String,
    pub focus_topic: String,
    pub focus_since: u64,
    pub last_decision: Option<LastDecision>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            youtube_enabled: true,
            blocklist: ["reddit.com", "tiktok.com", "instagram.com"]
                .into_iter()
                .map(String::from)
                .collect(),
            show_after_seconds: 0.0,
            break_until: 0,
            break_host: String::new(),
            break_reason: String::new(),
            focus_topic: String::new(),
            focus_since: 0,
            last_decision: None,
        }
    }
}

impl Settings {
    /// Flatten into the persisted key-value shape
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).context("Failed to serialize settings")? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("Settings serialized to a non-object value: {other}"),
        }
    }

    /// Rebuild settings from the persisted key-value shape
    ///
    /// # Errors
    ///
    /// Returns an error if a stored value has the wrong type
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map)).context("Stored settings are malformed")
    }
}
