//! Per-page enforcement: overlay visibility and break-expiry checks.
//!
//! Each check splits into a pure decision (settings and state in, action out)
//! and the code that applies it through the bus and the overlay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use focusorb_storage::Settings;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::break_session::BreakState;
use crate::clock::Clock;
use crate::config::PageTimings;
use crate::dwell::{DwellDecision, DwellTimer};
use crate::messages::{MessageBus, Request, Response};
use crate::navigation::NavigationWatcher;
use crate::overlay::{parse_break_minutes, OverlayCommand};
use crate::page::{is_monitored, OverlayView, PageId, PageProbe};
use crate::scheduler::{RepeatingTask, Scheduler, TaskId};

const EXPIRY_TITLE: &str = "Break is over";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAction {
    Show,
    Remove,
    Keep,
}

/// Transition from the overlay's current state to the wanted one
#[must_use]
pub const fn overlay_action(want_visible: bool, shown: bool) -> OverlayAction {
    match (want_visible, shown) {
        (true, false) => OverlayAction::Show,
        (false, true) => OverlayAction::Remove,
        _ => OverlayAction::Keep,
    }
}

/// Dwell says show, unless a break is running for this host
#[must_use]
pub const fn should_show(dwell: DwellDecision, break_active: bool) -> bool {
    dwell.show && !break_active
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectiveAction {
    ClosePage { host: String },
}

/// Close a monitored page whose host's break has run out
#[must_use]
pub fn expiry_action(
    state: &BreakState,
    page_host: &str,
    monitored: bool,
    now_ms: u64,
) -> Option<CorrectiveAction> {
    let lapsed = !state.break_host.is_empty()
        && state.break_host == page_host
        && !state.is_active_for(page_host, now_ms);
    (lapsed && monitored).then(|| CorrectiveAction::ClosePage {
        host: page_host.to_string(),
    })
}

/// Mutable state of one page context, shared by its repeating tasks
#[derive(Debug)]
pub(crate) struct PageContext {
    pub(crate) dwell: DwellTimer,
    pub(crate) overlay_shown: bool,
    pub(crate) closed: bool,
    /// Break-over notice already sent for this page
    pub(crate) expiry_notified: bool,
    pub(crate) last_settings: Option<Settings>,
}

impl PageContext {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            dwell: DwellTimer::new(clock),
            overlay_shown: false,
            closed: false,
            expiry_notified: false,
            last_settings: None,
        }
    }

    pub(crate) fn apply(&mut self, action: OverlayAction, overlay: &dyn OverlayView) {
        match action {
            OverlayAction::Show => {
                overlay.show();
                self.overlay_shown = true;
            }
            OverlayAction::Remove => {
                overlay.remove();
                self.overlay_shown = false;
            }
            OverlayAction::Keep => {}
        }
    }

    pub(crate) fn hide_overlay(&mut self, overlay: &dyn OverlayView) {
        self.apply(overlay_action(false, self.overlay_shown), overlay);
    }
}

pub(crate) type SharedPage = Arc<Mutex<PageContext>>;

struct VisibilityCheck {
    bus: Arc<dyn MessageBus>,
    probe: Arc<dyn PageProbe>,
    overlay: Arc<dyn OverlayView>,
    clock: Arc<dyn Clock>,
    page: SharedPage,
}

#[async_trait]
impl RepeatingTask for VisibilityCheck {
    fn name(&self) -> &'static str {
        "visibility check"
    }

    async fn run_once(&mut self) -> Result<()> {
        let response = self.bus.request(Request::GetSettings).await;
        let snapshot = self.probe.snapshot();

        let mut page = self.page.lock().await;
        if page.closed {
            return Ok(());
        }

        let settings: Settings = match response.data_as() {
            Ok(settings) => settings,
            Err(e) => {
                // Fail open; the dwell marker survives until settings return
                page.hide_overlay(self.overlay.as_ref());
                return Err(e).context("Settings unavailable");
            }
        };

        let dwell = page.dwell.evaluate(&settings, &snapshot);
        let now = self.clock.now_ms();
        let break_active = snapshot
            .host()
            .is_some_and(|host| BreakState::from_settings(&settings).is_active_for(&host, now));

        let action = overlay_action(should_show(dwell, break_active), page.overlay_shown);
        if action == OverlayAction::Show {
            log::info!("Showing overlay on {}", snapshot.url);
        }
        page.apply(action, self.overlay.as_ref());
        page.last_settings = Some(settings);
        Ok(())
    }
}

struct BreakExpiryCheck {
    bus: Arc<dyn MessageBus>,
    probe: Arc<dyn PageProbe>,
    clock: Arc<dyn Clock>,
    page: SharedPage,
}

#[async_trait]
impl RepeatingTask for BreakExpiryCheck {
    fn name(&self) -> &'static str {
        "break expiry check"
    }

    async fn run_once(&mut self) -> Result<()> {
        if self.page.lock().await.closed {
            return Ok(());
        }

        let state: BreakState = self.bus.request(Request::GetBreak).await.data_as()?;
        let snapshot = self.probe.snapshot();
        let Some(host) = snapshot.host() else {
            return Ok(());
        };

        let (action, first_attempt) = {
            let mut page = self.page.lock().await;
            if page.closed {
                return Ok(());
            }
            let settings = page.last_settings.clone().unwrap_or_default();
            let monitored = is_monitored(&settings, &snapshot.url);
            let action = expiry_action(&state, &host, monitored, self.clock.now_ms());
            let first_attempt = action.is_some() && !page.expiry_notified;
            if action.is_some() {
                page.closed = true;
                page.expiry_notified = true;
            }
            (action, first_attempt)
        };

        let Some(CorrectiveAction::ClosePage { host }) = action else {
            return Ok(());
        };

        if first_attempt {
            log::info!("Break on {host} is over, closing page");
            let notified = self
                .bus
                .request(Request::Notify {
                    title: Some(EXPIRY_TITLE.to_string()),
                    message: Some(format!("Back to work. Closing {host}.")),
                })
                .await;
            if let Err(e) = notified.into_result() {
                log::warn!("Break-over notification failed: {e}");
            }
        }

        if let Err(e) = self.bus.request(Request::CloseTab).await.into_result() {
            // Still open: keep enforcing and retry on the next tick
            self.page.lock().await.closed = false;
            return Err(e).with_context(|| format!("Failed to close page on {host}"));
        }
        Ok(())
    }
}

/// Enforcement for one page context
///
/// Owns the shared page state; the repeating tasks started by
/// [`PageSession::start`] and the overlay commands all act on it.
pub struct PageSession {
    id: PageId,
    bus: Arc<dyn MessageBus>,
    probe: Arc<dyn PageProbe>,
    overlay: Arc<dyn OverlayView>,
    clock: Arc<dyn Clock>,
    timings: PageTimings,
    page: SharedPage,
}

impl PageSession {
    #[must_use]
    pub fn new(
        id: PageId,
        bus: Arc<dyn MessageBus>,
        probe: Arc<dyn PageProbe>,
        overlay: Arc<dyn OverlayView>,
        clock: Arc<dyn Clock>,
        timings: PageTimings,
    ) -> Self {
        let page = Arc::new(Mutex::new(PageContext::new(clock.clone())));
        Self {
            id,
            bus,
            probe,
            overlay,
            clock,
            timings,
            page,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &PageId {
        &self.id
    }

    /// Start the visibility, expiry and navigation tasks on `scheduler`
    pub fn start(&self, scheduler: &mut dyn Scheduler) -> Vec<TaskId> {
        let visibility = VisibilityCheck {
            bus: self.bus.clone(),
            probe: self.probe.clone(),
            overlay: self.overlay.clone(),
            clock: self.clock.clone(),
            page: self.page.clone(),
        };
        let expiry = BreakExpiryCheck {
            bus: self.bus.clone(),
            probe: self.probe.clone(),
            clock: self.clock.clone(),
            page: self.page.clone(),
        };
        let navigation =
            NavigationWatcher::new(self.probe.clone(), self.overlay.clone(), self.page.clone());

        log::debug!("Starting enforcement for page {}", self.id);
        vec![
            scheduler.start(self.timings.visibility, Box::new(visibility)),
            scheduler.start(self.timings.expiry, Box::new(expiry)),
            scheduler.start(self.timings.navigation, Box::new(navigation)),
        ]
    }

    pub async fn is_closed(&self) -> bool {
        self.page.lock().await.closed
    }

    pub async fn overlay_shown(&self) -> bool {
        self.page.lock().await.overlay_shown
    }

    pub async fn dwell_elapsed(&self) -> Duration {
        self.page.lock().await.dwell.elapsed()
    }

    /// Run one of the overlay's actions
    ///
    /// # Errors
    ///
    /// Returns an error if the page has no host to break on or the
    /// background rejects the request. `Dismiss` never reaches the bus.
    pub async fn submit(&self, command: OverlayCommand) -> Result<Response> {
        let request = match command {
            OverlayCommand::CheckWithAi { reason } => Request::EvalWithAi {
                payload: self.evaluation_payload(&reason).await,
            },
            OverlayCommand::TakeBreak { text } => {
                let host = self
                    .probe
                    .snapshot()
                    .host()
                    .context("Page has no host to take a break on")?;
                let minutes = parse_break_minutes(&text)
                    .unwrap_or_else(|| f64::from(self.timings.default_break_minutes));
                Request::StartBreak {
                    minutes,
                    host,
                    reason: text,
                }
            }
            OverlayCommand::CloseNow => Request::CloseTab,
            OverlayCommand::Dismiss => {
                self.page.lock().await.hide_overlay(self.overlay.as_ref());
                return Ok(Response::ok());
            }
        };

        if !matches!(request, Request::CloseTab) {
            self.page.lock().await.hide_overlay(self.overlay.as_ref());
        }

        let kind = request.kind();
        let response = self.bus.request(request).await;
        response
            .into_result()
            .with_context(|| format!("{kind} was rejected"))
    }

    async fn evaluation_payload(&self, reason: &str) -> Value {
        let snapshot = self.probe.snapshot();
        let focus_topic = self
            .page
            .lock()
            .await
            .last_settings
            .as_ref()
            .map(|s| s.focus_topic.clone())
            .filter(|topic| !topic.is_empty());

        let host = snapshot.host().unwrap_or_default();

        let mut payload = Map::new();
        payload.insert("title".to_string(), json!(snapshot.title));
        payload.insert(
            "channel".to_string(),
            json!(snapshot.channel.unwrap_or_default()),
        );
        payload.insert("url".to_string(), json!(snapshot.url));
        payload.insert("host".to_string(), json!(host));
        if let Some(topic) = focus_topic {
            payload.insert("focusTopic".to_string(), json!(topic));
        }
        payload.insert("reason".to_string(), json!(reason));
        Value::Object(payload)
    }
}
