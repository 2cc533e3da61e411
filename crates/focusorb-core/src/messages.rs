//! Request/response message bus between page contexts and the background.
//!
//! Every failure is folded into a `{ok: false, error}` response; nothing
//! crosses the bus as a Rust error.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::break_session::BreakState;

const KNOWN_TYPES: [&str; 9] = [
    "GET_SETTINGS",
    "START_BREAK",
    "GET_BREAK",
    "END_BREAK",
    "SET_FOCUS",
    "CLOSE_TAB",
    "NOTIFY",
    "EVAL_WITH_AI",
    "CHAT",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    GetSettings,
    StartBreak {
        #[serde(default)]
        minutes: f64,
        #[serde(default)]
        host: String,
        #[serde(default)]
        reason: String,
    },
    GetBreak,
    EndBreak,
    SetFocus {
        #[serde(default)]
        topic: String,
    },
    CloseTab,
    Notify {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    EvalWithAi {
        #[serde(default)]
        payload: Value,
    },
    Chat {
        #[serde(default)]
        payload: Value,
    },
}

impl Request {
    /// Decode a raw message, separating unknown types from malformed known ones
    ///
    /// # Errors
    ///
    /// Returns `UnknownMessage` for a missing or unrecognised `type`, and
    /// `Malformed` when a known type carries fields of the wrong shape
    pub fn parse(message: Value) -> Result<Self, BusError> {
        let known = message
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| KNOWN_TYPES.contains(&kind));
        if !known {
            return Err(BusError::UnknownMessage);
        }
        serde_json::from_value(message).map_err(|e| BusError::Malformed(e.to_string()))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::GetSettings => "GET_SETTINGS",
            Self::StartBreak { .. } => "START_BREAK",
            Self::GetBreak => "GET_BREAK",
            Self::EndBreak => "END_BREAK",
            Self::SetFocus { .. } => "SET_FOCUS",
            Self::CloseTab => "CLOSE_TAB",
            Self::Notify { .. } => "NOTIFY",
            Self::EvalWithAi { .. } => "EVAL_WITH_AI",
            Self::Chat { .. } => "CHAT",
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Unknown message type")]
    UnknownMessage,
    #[error("Malformed request: {0}")]
    Malformed(String),
    #[error("Store access failed: {0}")]
    Store(String),
    #[error("Backend call failed: {0}")]
    Remote(String),
    #[error("No requesting page to close")]
    NoSenderPage,
    #[error("Failed to close page: {0}")]
    ClosePage(String),
    #[error("Transport failed: {0}")]
    Transport(String),
    /// A `{ok: false}` response seen from the requesting side
    #[error("{0}")]
    Rejected(String),
}

impl BusError {
    #[must_use]
    pub fn store(err: &anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }

    #[must_use]
    pub fn remote(err: &anyhow::Error) -> Self {
        Self::Remote(format!("{err:#}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_data(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn granted(state: &BreakState) -> Self {
        Self {
            ok: true,
            break_until: Some(state.break_until),
            break_host: Some(state.break_host.clone()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failure(err: &BusError) -> Self {
        Self {
            ok: false,
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    /// Turn a failed response back into an error
    ///
    /// # Errors
    ///
    /// Returns `Rejected` carrying the response's error text when `ok` is false
    pub fn into_result(self) -> Result<Self, BusError> {
        if self.ok {
            Ok(self)
        } else {
            Err(BusError::Rejected(
                self.error.unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }

    /// Decode the `data` field
    ///
    /// # Errors
    ///
    /// Returns an error if the response failed or `data` does not match `T`
    pub fn data_as<T: DeserializeOwned>(self) -> Result<T, BusError> {
        let data = self.into_result()?.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| BusError::Malformed(e.to_string()))
    }
}

/// Asynchronous request/response channel to the background handler
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn request(&self, request: Request) -> Response;
}
