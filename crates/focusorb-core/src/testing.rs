//! Test doubles shared across module tests.

use anyhow::Result;
use async_trait::async_trait;
use focusorb_ai::{ChatReply, DecisionOracle, Verdict};
use focusorb_storage::{KeyValueStore, MemoryStore, SettingsStore};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::background::{BackgroundHandler, TabControl};
use crate::clock::ManualClock;
use crate::notify::Notifier;
use crate::page::{MediaState, OverlayView, PageId, PageProbe, PageSnapshot};

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Store whose every operation fails
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _keys: &[&str]) -> Result<Map<String, Value>> {
        anyhow::bail!("store unavailable")
    }

    fn get_all(&self) -> Result<Map<String, Value>> {
        anyhow::bail!("store unavailable")
    }

    fn set(&self, _values: Map<String, Value>) -> Result<()> {
        anyhow::bail!("store unavailable")
    }
}

/// Oracle that always answers with the same verdict
pub struct StaticOracle {
    pub verdict: Verdict,
    pub reply: String,
}

impl StaticOracle {
    pub fn allowing() -> Self {
        Self {
            verdict: Verdict {
                allowed: true,
                reason: "On topic".to_string(),
                score: Some(0.9),
            },
            reply: "Keep going".to_string(),
        }
    }

    pub fn blocking() -> Self {
        Self {
            verdict: Verdict {
                allowed: false,
                reason: "Off topic".to_string(),
                score: Some(0.1),
            },
            reply: "Get back to it".to_string(),
        }
    }
}

#[async_trait]
impl DecisionOracle for StaticOracle {
    async fn evaluate(&self, _payload: &Value) -> Result<Verdict> {
        Ok(self.verdict.clone())
    }

    async fn chat(&self, _payload: &Value) -> Result<ChatReply> {
        Ok(ChatReply {
            reply: self.reply.clone(),
        })
    }
}

pub struct FailingOracle;

#[async_trait]
impl DecisionOracle for FailingOracle {
    async fn evaluate(&self, _payload: &Value) -> Result<Verdict> {
        anyhow::bail!("connection refused")
    }

    async fn chat(&self, _payload: &Value) -> Result<ChatReply> {
        anyhow::bail!("connection refused")
    }

    async fn is_available(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct RecordingTabs {
    closed: Mutex<Vec<PageId>>,
}

impl RecordingTabs {
    pub fn closed(&self) -> Vec<PageId> {
        self.closed.lock().unwrap().clone()
    }
}

impl TabControl for RecordingTabs {
    fn close(&self, page: &PageId) -> Result<()> {
        self.closed.lock().unwrap().push(page.clone());
        Ok(())
    }
}

/// Page whose URL and playback the test changes between ticks
#[derive(Debug)]
pub struct ScriptedPage {
    snapshot: Mutex<PageSnapshot>,
}

impl ScriptedPage {
    pub fn new(url: &str, media: Option<MediaState>) -> Self {
        let mut snapshot = PageSnapshot::new(url);
        snapshot.media = media;
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set_url(&self, url: &str) {
        self.snapshot.lock().unwrap().url = url.to_string();
    }

    pub fn set_media(&self, media: Option<MediaState>) {
        self.snapshot.lock().unwrap().media = media;
    }
}

impl PageProbe for ScriptedPage {
    fn snapshot(&self) -> PageSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}

#[derive(Debug, Default)]
pub struct RecordingOverlay {
    shows: AtomicUsize,
    removes: AtomicUsize,
    visible: Mutex<bool>,
}

impl RecordingOverlay {
    pub fn shows(&self) -> usize {
        self.shows.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.lock().unwrap()
    }
}

impl OverlayView for RecordingOverlay {
    fn show(&self) {
        self.shows.fetch_add(1, Ordering::SeqCst);
        *self.visible.lock().unwrap() = true;
    }

    fn remove(&self) {
        self.removes.fetch_add(1, Ordering::SeqCst);
        *self.visible.lock().unwrap() = false;
    }
}

/// Handler wired to in-memory doubles
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub tabs: Arc<RecordingTabs>,
    pub settings: SettingsStore,
    pub handler: Arc<BackgroundHandler>,
}

pub fn harness(start_ms: u64, oracle: Arc<dyn DecisionOracle>) -> Harness {
    let clock = Arc::new(ManualClock::new(start_ms));
    let notifier = Arc::new(RecordingNotifier::default());
    let tabs = Arc::new(RecordingTabs::default());
    let settings = SettingsStore::new(Arc::new(MemoryStore::new()));
    let handler = Arc::new(BackgroundHandler::new(
        settings.clone(),
        oracle,
        notifier.clone(),
        tabs.clone(),
        clock.clone(),
    ));
    handler.install().unwrap();
    Harness {
        clock,
        notifier,
        tabs,
        settings,
        handler,
    }
}
