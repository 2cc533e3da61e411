use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verdict on whether the current page serves the user's focus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// A verdict without an explicit `allowed` field lets the page through
    #[serde(default = "allowed_by_default")]
    pub allowed: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

const fn allowed_by_default() -> bool {
    true
}

impl Verdict {
    /// Text shown to the user for this verdict
    #[must_use]
    pub fn summary(&self) -> &str {
        if !self.reason.is_empty() {
            &self.reason
        } else if self.allowed {
            "Allowed"
        } else {
            "Blocked"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Opaque decision backend: page evaluation and focus chat
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Ask whether the page described by `payload` is allowed
    async fn evaluate(&self, payload: &Value) -> Result<Verdict>;

    /// Relay a chat message
    async fn chat(&self, payload: &Value) -> Result<ChatReply>;

    /// Check if the backend is reachable
    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_defaults_to_allowed() {
        let verdict: Verdict = serde_json::from_str(r#"{"reason":"looks fine"}"#).unwrap();
        assert!(verdict.allowed);
        assert_eq!(verdict.score, None);
    }

    #[test]
    fn test_verdict_summary_prefers_reason() {
        let verdict = Verdict {
            allowed: false,
            reason: "Not related to chemistry".to_string(),
            score: Some(2.0),
        };
        assert_eq!(verdict.summary(), "Not related to chemistry");
    }

    #[test]
    fn test_verdict_summary_fallbacks() {
        let blocked = Verdict {
            allowed: false,
            reason: String::new(),
            score: None,
        };
        assert_eq!(blocked.summary(), "Blocked");

        let allowed = Verdict {
            allowed: true,
            ..blocked
        };
        assert_eq!(allowed.summary(), "Allowed");
    }

    #[test]
    fn test_verdict_omits_missing_score() {
        let verdict = Verdict {
            allowed: true,
            reason: "ok".to_string(),
            score: None,
        };
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(!json.contains("score"));
    }
}
