use anyhow::{Context, Result};
use focusorb_storage::{keys, Settings, SettingsStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::clock::Clock;
use crate::notify::Notifier;
use crate::page::normalize_host;

pub const MS_PER_MINUTE: u64 = 60_000;
const NOTIFY_TITLE: &str = "FocusOrb";

/// Break fields as exposed by `GET_BREAK`
///
/// Expiry is derived: a state whose `break_until` has passed is inactive even
/// though its fields are still populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakState {
    pub break_until: u64,
    pub break_host: String,
}

impl BreakState {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            break_until: settings.break_until,
            break_host: settings.break_host.clone(),
        }
    }

    /// The only definition of "in break"
    #[must_use]
    pub fn is_active_for(&self, host: &str, now_ms: u64) -> bool {
        self.break_until > now_ms && !self.break_host.is_empty() && self.break_host == host
    }
}

/// Convert requested minutes to milliseconds; negative and NaN clamp to 0
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn minutes_to_ms(minutes: f64) -> u64 {
    if minutes.is_nan() || minutes <= 0.0 {
        return 0;
    }
    (minutes * 60_000.0).round() as u64
}

/// New expiry for a grant of `minutes` on `host`
///
/// An active session on the same host is extended from its current expiry;
/// anything else (no session, expired session, other host) starts from `now`.
#[must_use]
pub fn plan_grant(current: &BreakState, host: &str, minutes: f64, now_ms: u64) -> u64 {
    let extension = minutes_to_ms(minutes);
    if current.is_active_for(host, now_ms) {
        current.break_until.saturating_add(extension)
    } else {
        now_ms.saturating_add(extension)
    }
}

fn display_minutes(minutes: f64) -> String {
    let clamped = if minutes.is_nan() { 0.0 } else { minutes.max(0.0) };
    format!("{clamped}")
}

/// Owns all mutation of the break fields in the settings store
pub struct BreakSessionManager {
    settings: SettingsStore,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl BreakSessionManager {
    #[must_use]
    pub fn new(settings: SettingsStore, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            settings,
            clock,
            notifier,
        }
    }

    /// Grant or extend a break for `host`
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is empty or the store cannot be read or written
    pub fn start_break(&self, host: &str, minutes: f64, reason: &str) -> Result<BreakState> {
        let host = normalize_host(host);
        anyhow::ensure!(!host.is_empty(), "Break host must not be empty");

        let now = self.clock.now_ms();
        let current = self.get_break()?;
        let extending = current.is_active_for(&host, now);
        let break_until = plan_grant(&current, &host, minutes, now);

        let mut patch = Map::new();
        patch.insert(keys::BREAK_UNTIL.to_string(), json!(break_until));
        patch.insert(keys::BREAK_HOST.to_string(), json!(host));
        patch.insert(keys::BREAK_REASON.to_string(), json!(reason));
        self.settings
            .merge(patch)
            .context("Failed to persist break")?;

        if extending {
            log::info!("Extended break on {host} until {break_until}");
        } else if !current.break_host.is_empty() && current.break_host != host && current.break_until > now {
            log::info!(
                "Replaced break on {} with a new break on {host} until {break_until}",
                current.break_host
            );
        } else {
            log::info!("Granted break on {host} until {break_until}");
        }

        self.notifier.notify(
            NOTIFY_TITLE,
            &format!("Break granted ({} min)", display_minutes(minutes)),
        );

        Ok(BreakState {
            break_until,
            break_host: host,
        })
    }

    /// Clear every break field; safe to call with no break running
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written
    pub fn end_break(&self) -> Result<()> {
        let mut patch = Map::new();
        patch.insert(keys::BREAK_UNTIL.to_string(), json!(0));
        patch.insert(keys::BREAK_HOST.to_string(), json!(""));
        patch.insert(keys::BREAK_REASON.to_string(), json!(""));
        self.settings.merge(patch).context("Failed to clear break")?;

        log::info!("Break ended");
        self.notifier.notify(NOTIFY_TITLE, "Break ended");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds malformed break fields
    pub fn get_break(&self) -> Result<BreakState> {
        let fields = self
            .settings
            .fields(&[keys::BREAK_UNTIL, keys::BREAK_HOST])
            .context("Failed to read break state")?;
        serde_json::from_value(Value::Object(fields)).context("Stored break state is malformed")
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    pub fn is_break_active(&self, host: &str) -> Result<bool> {
        let state = self.get_break()?;
        Ok(state.is_active_for(&normalize_host(host), self.clock.now_ms()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{FailingStore, RecordingNotifier};
    use focusorb_storage::MemoryStore;
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        settings: SettingsStore,
        manager: BreakSessionManager,
    }

    fn fixture(start_ms: u64) -> Fixture {
        let clock = Arc::new(ManualClock::new(start_ms));
        let notifier = Arc::new(RecordingNotifier::default());
        let settings = SettingsStore::new(Arc::new(MemoryStore::new()));
        settings.seed_defaults().unwrap();
        let manager = BreakSessionManager::new(settings.clone(), clock.clone(), notifier.clone());
        Fixture {
            clock,
            notifier,
            settings,
            manager,
        }
    }

    #[test]
    fn test_fresh_break_starts_from_now() {
        let f = fixture(1_000_000);

        let state = f.manager.start_break("youtube.com", 10.0, "lunch").unwrap();

        assert_eq!(state.break_until, 1_000_000 + 10 * MS_PER_MINUTE);
        assert_eq!(state.break_host, "youtube.com");
        let stored = f.settings.load().unwrap();
        assert_eq!(stored.break_until, state.break_until);
        assert_eq!(stored.break_reason, "lunch");
    }

    #[test]
    fn test_same_host_extends_additively() {
        let f = fixture(0);

        let first = f.manager.start_break("youtube.com", 5.0, "").unwrap();
        assert_eq!(first.break_until, 300_000);

        f.clock.advance(Duration::from_millis(100_000));
        let second = f.manager.start_break("youtube.com", 3.0, "").unwrap();
        assert_eq!(second.break_until, 480_000);
    }

    #[test]
    fn test_other_host_discards_previous_session() {
        let f = fixture(0);
        f.manager.start_break("youtube.com", 30.0, "music").unwrap();

        f.clock.advance(Duration::from_secs(60));
        let state = f.manager.start_break("reddit.com", 2.0, "news").unwrap();

        assert_eq!(state.break_until, 60_000 + 2 * MS_PER_MINUTE);
        assert_eq!(state.break_host, "reddit.com");
        assert!(!f.manager.is_break_active("youtube.com").unwrap());
        assert_eq!(f.settings.load().unwrap().break_reason, "news");
    }

    #[test]
    fn test_expired_session_restarts_from_now() {
        let f = fixture(0);
        f.manager.start_break("youtube.com", 1.0, "").unwrap();

        f.clock.advance(Duration::from_secs(120));
        let state = f.manager.start_break("youtube.com", 1.0, "").unwrap();
        assert_eq!(state.break_until, 120_000 + MS_PER_MINUTE);
    }

    #[test]
    fn test_negative_minutes_clamp_to_zero() {
        let f = fixture(50_000);
        f.manager.start_break("youtube.com", 5.0, "").unwrap();

        let state = f.manager.start_break("youtube.com", -3.0, "").unwrap();
        assert_eq!(state.break_until, 50_000 + 5 * MS_PER_MINUTE);
        assert_eq!(minutes_to_ms(f64::NAN), 0);
    }

    #[test]
    fn test_host_is_normalized() {
        let f = fixture(0);
        let state = f.manager.start_break("www.YouTube.com", 5.0, "").unwrap();
        assert_eq!(state.break_host, "youtube.com");
        assert!(f.manager.is_break_active("youtube.com").unwrap());
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let f = fixture(0);
        assert!(f.manager.start_break("  ", 5.0, "").is_err());
        assert_eq!(f.settings.load().unwrap().break_until, 0);
    }

    #[test]
    fn test_break_inactive_once_expiry_reached() {
        let f = fixture(0);
        f.manager.start_break("youtube.com", 1.0, "").unwrap();

        f.clock.advance(Duration::from_millis(59_999));
        assert!(f.manager.is_break_active("youtube.com").unwrap());

        f.clock.advance(Duration::from_millis(1));
        assert!(!f.manager.is_break_active("youtube.com").unwrap());
        // Fields stay populated; expiry is derived
        assert_eq!(f.manager.get_break().unwrap().break_host, "youtube.com");
    }

    #[test]
    fn test_end_break_is_idempotent() {
        let f = fixture(0);
        f.manager.start_break("youtube.com", 5.0, "why not").unwrap();

        f.manager.end_break().unwrap();
        f.manager.end_break().unwrap();

        let stored = f.settings.load().unwrap();
        assert_eq!(stored.break_until, 0);
        assert!(stored.break_host.is_empty());
        assert!(stored.break_reason.is_empty());
        assert!(!f.manager.is_break_active("youtube.com").unwrap());
    }

    #[test]
    fn test_notifications_are_emitted() {
        let f = fixture(0);
        f.manager.start_break("youtube.com", 5.0, "").unwrap();
        f.manager.end_break().unwrap();

        let messages = f.notifier.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].1, "Break granted (5 min)");
        assert_eq!(messages[1].1, "Break ended");
    }

    #[test]
    fn test_store_failure_is_surfaced() {
        let manager = BreakSessionManager::new(
            SettingsStore::new(Arc::new(FailingStore)),
            Arc::new(ManualClock::new(0)),
            Arc::new(RecordingNotifier::default()),
        );
        assert!(manager.start_break("youtube.com", 5.0, "").is_err());
        assert!(manager.get_break().is_err());
        assert!(manager.end_break().is_err());
    }

    #[test]
    fn test_plan_grant_is_pure() {
        let current = BreakState {
            break_until: 300_000,
            break_host: "youtube.com".to_string(),
        };
        assert_eq!(plan_grant(&current, "youtube.com", 3.0, 100_000), 480_000);
        assert_eq!(plan_grant(&current, "reddit.com", 3.0, 100_000), 280_000);
        assert_eq!(plan_grant(&current, "youtube.com", 3.0, 300_000), 480_000);
    }
}
