use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::oracle::{ChatReply, DecisionOracle, Verdict};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// The backend answered, but not with a verdict
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend {endpoint} refused the request ({status}): {body}")]
    Rejected {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },
}

/// Local evaluation/chat backend reached over HTTP
pub struct HttpOracle {
    client: Client,
    base_url: String,
}

impl HttpOracle {
    /// Create a client for the backend at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BACKEND_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, endpoint: &'static str, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}{endpoint}", self.base_url);
        log::debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {url}"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        log::warn!("Backend {endpoint} answered {status}");
        Err(BackendError::Rejected {
            endpoint,
            status,
            body: body.trim().to_string(),
        }
        .into())
    }
}

#[async_trait]
impl DecisionOracle for HttpOracle {
    async fn evaluate(&self, payload: &Value) -> Result<Verdict> {
        let verdict: Verdict = self
            .post("/evaluate", payload)
            .await?
            .json()
            .await
            .context("Failed to parse evaluation response")?;

        log::info!(
            "Backend verdict: allowed={} score={:?}",
            verdict.allowed,
            verdict.score
        );
        Ok(verdict)
    }

    async fn chat(&self, payload: &Value) -> Result<ChatReply> {
        self.post("/chat", payload)
            .await?
            .json()
            .await
            .context("Failed to parse chat response")
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("Backend health check failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn oracle_for(server: &mockito::ServerGuard) -> HttpOracle {
        HttpOracle::new(Some(&server.url()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let oracle = HttpOracle::new(Some("http://localhost:9000/"), Duration::from_secs(1)).unwrap();
        assert_eq!(oracle.base_url(), "http://localhost:9000");

        let oracle = HttpOracle::new(None, Duration::from_secs(1)).unwrap();
        assert_eq!(oracle.base_url(), DEFAULT_BACKEND_URL);
    }

    #[tokio::test]
    async fn test_evaluate_parses_verdict() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/evaluate")
            .match_body(mockito::Matcher::PartialJson(json!({"host": "youtube.com"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"allowed": false, "reason": "Off topic", "score": 2}"#)
            .create_async()
            .await;

        let verdict = oracle_for(&server)
            .evaluate(&json!({"host": "youtube.com", "reason": "just browsing"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, "Off topic");
        assert_eq!(verdict.score, Some(2.0));
    }

    #[tokio::test]
    async fn test_evaluate_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/evaluate")
            .with_status(500)
            .with_body("model unavailable")
            .create_async()
            .await;

        let err = oracle_for(&server)
            .evaluate(&json!({}))
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("500"));
        assert!(message.contains("model unavailable"));
        match err.downcast_ref::<BackendError>() {
            Some(BackendError::Rejected {
                endpoint, status, ..
            }) => {
                assert_eq!(*endpoint, "/evaluate");
                assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            None => panic!("expected a backend rejection, got {err:#}"),
        }
    }

    #[tokio::test]
    async fn test_evaluate_rejects_non_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/evaluate")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        assert!(oracle_for(&server).evaluate(&json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_chat_returns_reply() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"reply": "Back to the problem set?"}"#)
            .create_async()
            .await;

        let reply = oracle_for(&server)
            .chat(&json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(reply.reply, "Back to the problem set?");
    }

    #[tokio::test]
    async fn test_is_available() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        assert!(oracle_for(&server).is_available().await);
    }
}
