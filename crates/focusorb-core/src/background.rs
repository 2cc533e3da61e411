//! Background message handler: the single owner of the settings store.

use anyhow::Result;
use async_trait::async_trait;
use focusorb_ai::DecisionOracle;
use focusorb_storage::{keys, LastDecision, Settings, SettingsStore};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::break_session::BreakSessionManager;
use crate::clock::Clock;
use crate::messages::{BusError, MessageBus, Request, Response};
use crate::notify::Notifier;
use crate::page::{normalize_host, PageId};

const NOTIFY_TITLE: &str = "FocusOrb";
const DEFAULT_NOTIFY_MESSAGE: &str = "Stay focused.";

/// Closes the page that sent a request
pub trait TabControl: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the page cannot be closed
    fn close(&self, page: &PageId) -> Result<()>;
}

/// Pages hosted in this process, each with a close signal
#[derive(Debug, Default)]
pub struct TabRegistry {
    pages: Mutex<HashMap<PageId, watch::Sender<bool>>>,
}

impl TabRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PageId, watch::Sender<bool>>>> {
        self.pages
            .lock()
            .map_err(|_| anyhow::anyhow!("Tab registry lock poisoned"))
    }

    /// Register a page; the receiver flips to `true` when the page is closed
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned
    pub fn register(&self, page: &PageId) -> Result<watch::Receiver<bool>> {
        let (tx, rx) = watch::channel(false);
        self.lock()?.insert(page.clone(), tx);
        Ok(rx)
    }

    #[must_use]
    pub fn is_open(&self, page: &PageId) -> bool {
        self.lock().is_ok_and(|pages| pages.contains_key(page))
    }
}

impl TabControl for TabRegistry {
    fn close(&self, page: &PageId) -> Result<()> {
        match self.lock()?.remove(page) {
            Some(signal) => {
                // A dropped receiver means the page already went away
                let _ = signal.send(true);
                log::info!("Closed page {page}");
            }
            None => log::info!("Close requested for page {page}, which is not hosted here"),
        }
        Ok(())
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Response, BusError> {
    serde_json::to_value(value)
        .map(Response::with_data)
        .map_err(|e| BusError::Malformed(e.to_string()))
}

fn non_empty(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn object_or_empty(payload: Value) -> Value {
    if payload.is_null() {
        json!({})
    } else {
        payload
    }
}

pub struct BackgroundHandler {
    settings: SettingsStore,
    breaks: BreakSessionManager,
    oracle: Arc<dyn DecisionOracle>,
    notifier: Arc<dyn Notifier>,
    tabs: Arc<dyn TabControl>,
    clock: Arc<dyn Clock>,
}

impl BackgroundHandler {
    #[must_use]
    pub fn new(
        settings: SettingsStore,
        oracle: Arc<dyn DecisionOracle>,
        notifier: Arc<dyn Notifier>,
        tabs: Arc<dyn TabControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breaks = BreakSessionManager::new(settings.clone(), clock.clone(), notifier.clone());
        Self {
            settings,
            breaks,
            oracle,
            notifier,
            tabs,
            clock,
        }
    }

    /// First-run setup: seed defaults without clobbering existing values
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written
    pub fn install(&self) -> Result<Settings> {
        self.settings.seed_defaults()
    }

    #[must_use]
    pub const fn breaks(&self) -> &BreakSessionManager {
        &self.breaks
    }

    /// Handle a raw JSON message
    pub async fn handle_value(&self, message: Value, sender: Option<&PageId>) -> Response {
        match Request::parse(message) {
            Ok(request) => self.handle(request, sender).await,
            Err(e) => {
                log::warn!("Rejected message: {e}");
                Response::failure(&e)
            }
        }
    }

    pub async fn handle(&self, request: Request, sender: Option<&PageId>) -> Response {
        let kind = request.kind();
        match sender {
            Some(page) => log::debug!("Handling {kind} from page {page}"),
            None => log::debug!("Handling {kind}"),
        }

        match self.dispatch(request, sender).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("{kind} failed: {e}");
                Response::failure(&e)
            }
        }
    }

    async fn dispatch(&self, request: Request, sender: Option<&PageId>) -> Result<Response, BusError> {
        match request {
            Request::GetSettings => {
                let settings = self.settings.load().map_err(|e| BusError::store(&e))?;
                to_data(&settings)
            }
            Request::StartBreak {
                minutes,
                host,
                reason,
            } => self.start_break(&host, minutes, &reason),
            Request::GetBreak => {
                let state = self.breaks.get_break().map_err(|e| BusError::store(&e))?;
                to_data(&state)
            }
            Request::EndBreak => {
                self.breaks.end_break().map_err(|e| BusError::store(&e))?;
                Ok(Response::ok())
            }
            Request::SetFocus { topic } => self.set_focus(&topic),
            Request::CloseTab => {
                let page = sender.ok_or(BusError::NoSenderPage)?;
                self.tabs
                    .close(page)
                    .map_err(|e| BusError::ClosePage(format!("{e:#}")))?;
                Ok(Response::ok())
            }
            Request::Notify { title, message } => {
                self.notifier.notify(
                    &non_empty(title, NOTIFY_TITLE),
                    &non_empty(message, DEFAULT_NOTIFY_MESSAGE),
                );
                Ok(Response::ok())
            }
            Request::EvalWithAi { payload } => self.evaluate(object_or_empty(payload), sender).await,
            Request::Chat { payload } => {
                let reply = self
                    .oracle
                    .chat(&object_or_empty(payload))
                    .await
                    .map_err(|e| BusError::remote(&e))?;
                to_data(&reply)
            }
        }
    }

    fn start_break(&self, host: &str, minutes: f64, reason: &str) -> Result<Response, BusError> {
        if normalize_host(host).is_empty() {
            return Err(BusError::Malformed("START_BREAK requires a host".to_string()));
        }
        let state = self
            .breaks
            .start_break(host, minutes, reason)
            .map_err(|e| BusError::store(&e))?;
        Ok(Response::granted(&state))
    }

    fn set_focus(&self, topic: &str) -> Result<Response, BusError> {
        let topic = topic.trim();
        let since = if topic.is_empty() {
            0
        } else {
            self.clock.now_ms()
        };

        let mut patch = Map::new();
        patch.insert(keys::FOCUS_TOPIC.to_string(), json!(topic));
        patch.insert(keys::FOCUS_SINCE.to_string(), json!(since));
        self.settings.merge(patch).map_err(|e| BusError::store(&e))?;

        if topic.is_empty() {
            log::info!("Focus cleared");
        } else {
            log::info!("Focus set to '{topic}'");
        }
        Ok(Response::ok())
    }

    async fn evaluate(&self, payload: Value, sender: Option<&PageId>) -> Result<Response, BusError> {
        let verdict = self
            .oracle
            .evaluate(&payload)
            .await
            .map_err(|e| BusError::remote(&e))?;
        let output =
            serde_json::to_value(&verdict).map_err(|e| BusError::Malformed(e.to_string()))?;

        let decision = LastDecision {
            at: self.clock.now_ms(),
            input: payload,
            output: output.clone(),
        };
        let mut patch = Map::new();
        patch.insert(
            keys::LAST_DECISION.to_string(),
            serde_json::to_value(&decision).map_err(|e| BusError::Malformed(e.to_string()))?,
        );
        self.settings.merge(patch).map_err(|e| BusError::store(&e))?;

        self.notifier.notify(NOTIFY_TITLE, verdict.summary());

        if !verdict.allowed {
            match sender {
                Some(page) => {
                    if let Err(e) = self.tabs.close(page) {
                        log::warn!("Failed to close blocked page {page}: {e:#}");
                    }
                }
                None => log::info!("Blocked verdict without a page to close"),
            }
        }

        Ok(Response::with_data(output))
    }
}

/// Requests without a page of their own, e.g. from the command line
#[async_trait]
impl MessageBus for BackgroundHandler {
    async fn request(&self, request: Request) -> Response {
        self.handle(request, None).await
    }
}

/// In-process bus bound to one page's identity
pub struct PageBus {
    handler: Arc<BackgroundHandler>,
    sender: PageId,
}

impl PageBus {
    #[must_use]
    pub fn new(handler: Arc<BackgroundHandler>, sender: PageId) -> Self {
        Self { handler, sender }
    }
}

#[async_trait]
impl MessageBus for PageBus {
    async fn request(&self, request: Request) -> Response {
        self.handler.handle(request, Some(&self.sender)).await
    }
}
