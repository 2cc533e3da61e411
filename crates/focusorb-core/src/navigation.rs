//! In-page navigation detection.
//!
//! Single-page sites change the URL without a reload, so the page context
//! survives; a new URL means a new video and the dwell count starts over.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::enforcement::SharedPage;
use crate::page::{OverlayView, PageProbe};
use crate::scheduler::RepeatingTask;

pub struct NavigationWatcher {
    probe: Arc<dyn PageProbe>,
    overlay: Arc<dyn OverlayView>,
    page: SharedPage,
    last_url: Option<String>,
}

impl NavigationWatcher {
    pub(crate) fn new(
        probe: Arc<dyn PageProbe>,
        overlay: Arc<dyn OverlayView>,
        page: SharedPage,
    ) -> Self {
        Self {
            probe,
            overlay,
            page,
            last_url: None,
        }
    }
}

#[async_trait]
impl RepeatingTask for NavigationWatcher {
    fn name(&self) -> &'static str {
        "navigation watcher"
    }

    async fn run_once(&mut self) -> Result<()> {
        let url = self.probe.snapshot().url;
        let Some(previous) = self.last_url.replace(url.clone()) else {
            return Ok(());
        };
        if previous == url {
            return Ok(());
        }

        log::debug!("Navigated from {previous} to {url}");
        let mut page = self.page.lock().await;
        page.dwell.reset();
        page.hide_overlay(self.overlay.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::enforcement::PageContext;
    use crate::page::MediaState;
    use crate::testing::{RecordingOverlay, ScriptedPage};
    use focusorb_storage::Settings;
    use std::time::Duration;
    use tokio::sync::Mutex;

    const FIRST: &str = "https://www.youtube.com/watch?v=first";
    const SECOND: &str = "https://www.youtube.com/watch?v=second";

    #[tokio::test]
    async fn test_url_change_resets_dwell_and_overlay() {
        let clock = Arc::new(ManualClock::new(0));
        let probe = Arc::new(ScriptedPage::new(FIRST, Some(MediaState::playing())));
        let overlay = Arc::new(RecordingOverlay::default());
        let page = Arc::new(Mutex::new(PageContext::new(clock.clone())));
        let mut watcher = NavigationWatcher::new(probe.clone(), overlay.clone(), page.clone());

        {
            let mut ctx = page.lock().await;
            ctx.dwell.evaluate(&Settings::default(), &probe.snapshot());
            ctx.overlay_shown = true;
        }
        clock.advance(Duration::from_secs(40));

        // First observation only records the URL
        watcher.run_once().await.unwrap();
        watcher.run_once().await.unwrap();
        assert_eq!(page.lock().await.dwell.elapsed(), Duration::from_secs(40));
        assert_eq!(overlay.removes(), 0);

        probe.set_url(SECOND);
        watcher.run_once().await.unwrap();

        let ctx = page.lock().await;
        assert!(!ctx.dwell.is_running());
        assert!(!ctx.overlay_shown);
        assert_eq!(overlay.removes(), 1);
    }

    #[tokio::test]
    async fn test_navigation_without_overlay_does_not_touch_it() {
        let clock = Arc::new(ManualClock::new(0));
        let probe = Arc::new(ScriptedPage::new(FIRST, None));
        let overlay = Arc::new(RecordingOverlay::default());
        let page = Arc::new(Mutex::new(PageContext::new(clock)));
        let mut watcher = NavigationWatcher::new(probe.clone(), overlay.clone(), page);

        watcher.run_once().await.unwrap();
        probe.set_url(SECOND);
        watcher.run_once().await.unwrap();

        assert_eq!(overlay.removes(), 0);
        assert!(!overlay.is_visible());
    }
}
