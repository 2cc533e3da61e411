use focusorb_storage::Settings;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::page::{is_monitored, PageSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellDecision {
    pub show: bool,
}

/// Continuous-engagement timer for one page load
///
/// Any interruption (pause, leaving the watch view, disabling the feature)
/// restarts the count from zero.
#[derive(Debug)]
pub struct DwellTimer {
    clock: Arc<dyn Clock>,
    started_at: Option<Instant>,
}

impl DwellTimer {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            started_at: None,
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.map_or(Duration::ZERO, |started| {
            self.clock.monotonic_now().saturating_duration_since(started)
        })
    }

    pub fn reset(&mut self) {
        self.started_at = None;
    }

    pub fn evaluate(&mut self, settings: &Settings, page: &PageSnapshot) -> DwellDecision {
        let qualifying = settings.enabled && is_monitored(settings, &page.url) && page.is_playing();
        if !qualifying {
            self.reset();
            return DwellDecision { show: false };
        }

        let now = self.clock.monotonic_now();
        let started = *self.started_at.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);

        DwellDecision {
            show: elapsed.as_secs_f64() >= threshold_secs(settings),
        }
    }
}

/// Configured threshold, negatives treated as zero
fn threshold_secs(settings: &Settings) -> f64 {
    settings.show_after_seconds.max(0.0)
}
