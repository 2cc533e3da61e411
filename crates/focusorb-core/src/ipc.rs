use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
};

use crate::background::BackgroundHandler;
use crate::messages::{BusError, MessageBus, Request, Response};
use crate::page::PageId;

/// Frame sent from a client to the daemon; one per connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IpcEnvelope {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<PageId>,
        message: Value,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct IpcClient {
    sock_path: PathBuf,
    sender: Option<PageId>,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
            sender: None,
        }
    }

    /// Client whose requests are attributed to `page`
    #[must_use]
    pub fn for_page(sock_path: &Path, page: PageId) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
            sender: Some(page),
        }
    }

    async fn exchange(&self, envelope: &IpcEnvelope) -> Result<Response> {
        let mut stream = UnixStream::connect(&self.sock_path)
            .await
            .with_context(|| format!("Failed to connect to {}", self.sock_path.display()))?;

        let encoded = serde_json::to_vec(envelope)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response = serde_json::from_slice(&buffer).context("Malformed daemon response")?;
        Ok(response)
    }

    /// Send one bus message to the daemon
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or replies with garbage;
    /// a `{ok: false}` reply is returned as a normal response
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let envelope = IpcEnvelope::Message {
            sender: self.sender.clone(),
            message: serde_json::to_value(request)?,
        };
        self.exchange(&envelope).await
    }

    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable
    pub async fn shutdown(&self) -> Result<()> {
        self.exchange(&IpcEnvelope::Shutdown).await.map(|_| ())
    }
}

#[async_trait]
impl MessageBus for IpcClient {
    async fn request(&self, request: Request) -> Response {
        match self.send(&request).await {
            Ok(response) => response,
            Err(e) => Response::failure(&BusError::Transport(format!("{e:#}"))),
        }
    }
}

pub struct DaemonIpcHandler {
    handler: Arc<BackgroundHandler>,
    shutdown_signal: Arc<AtomicBool>,
}

impl DaemonIpcHandler {
    pub fn new(handler: Arc<BackgroundHandler>, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            handler,
            shutdown_signal,
        }
    }

    pub async fn respond(&self, envelope: IpcEnvelope) -> Response {
        match envelope {
            IpcEnvelope::Message { sender, message } => {
                self.handler.handle_value(message, sender.as_ref()).await
            }
            IpcEnvelope::Shutdown => {
                log::info!("Shutdown requested over IPC");
                self.shutdown_signal.store(true, Ordering::SeqCst);
                Response::ok()
            }
        }
    }

    async fn serve(&self, stream: &mut UnixStream) -> Result<()> {
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        if buffer.is_empty() {
            return Ok(());
        }

        let response = match serde_json::from_slice::<IpcEnvelope>(&buffer) {
            Ok(envelope) => self.respond(envelope).await,
            Err(e) => {
                log::error!("IPC deserialize error: {e}");
                Response::failure(&BusError::Malformed(e.to_string()))
            }
        };

        let encoded = serde_json::to_vec(&response)?;
        stream.write_all(&encoded).await?;
        Ok(())
    }
}

/// Accept connections on `sock_path` until the task is dropped
///
/// # Errors
///
/// Returns an error if the socket cannot be bound
pub async fn listen(handler: Arc<DaemonIpcHandler>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    let listener = UnixListener::bind(sock_path)?;

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler.serve(&mut stream).await {
                        log::error!("IPC handle error: {e:#}");
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, StaticOracle};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = IpcEnvelope::Message {
            sender: Some(PageId::from("tab-1")),
            message: json!({"type": "GET_BREAK"}),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"kind": "message", "sender": "tab-1", "message": {"type": "GET_BREAK"}})
        );

        let parsed: IpcEnvelope = serde_json::from_str(r#"{"kind":"shutdown"}"#).unwrap();
        assert_eq!(parsed, IpcEnvelope::Shutdown);
    }

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("focusorb.sock");
        let h = harness(0, Arc::new(StaticOracle::allowing()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let daemon = Arc::new(DaemonIpcHandler::new(h.handler.clone(), shutdown.clone()));

        let listener = {
            let sock_path = sock_path.clone();
            tokio::spawn(async move { listen(daemon, &sock_path).await })
        };
        for _ in 0..50 {
            if sock_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let client = IpcClient::for_page(&sock_path, PageId::from("tab-9"));
        let response = client
            .send(&Request::StartBreak {
                minutes: 5.0,
                host: "youtube.com".to_string(),
                reason: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(response.break_until, Some(300_000));

        let response = client.request(Request::CloseTab).await;
        assert!(response.ok);
        assert_eq!(h.tabs.closed(), vec![PageId::from("tab-9")]);

        // No sender attached
        let response = IpcClient::new(&sock_path).request(Request::CloseTab).await;
        assert!(!response.ok);

        IpcClient::new(&sock_path).shutdown().await.unwrap();
        assert!(shutdown.load(Ordering::SeqCst));

        listener.abort();
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(&dir.path().join("missing.sock"));

        let response = client.request(Request::GetBreak).await;
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("Transport failed"));
    }
}
