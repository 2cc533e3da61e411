//! Page model shared by the dwell timer and the enforcement checks.
//!
//! A page is *monitored* when it is a video watch view (and watch monitoring
//! is enabled) or when its host is on the blocklist.

use focusorb_storage::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

const WATCH_DOMAIN: &str = "youtube.com";

/// Identity of one page context (one tab)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Playback state of the page's media element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaState {
    pub paused: bool,
    pub ended: bool,
}

impl MediaState {
    #[must_use]
    pub const fn playing() -> Self {
        Self {
            paused: false,
            ended: false,
        }
    }

    #[must_use]
    pub const fn paused() -> Self {
        Self {
            paused: true,
            ended: false,
        }
    }

    #[must_use]
    pub const fn is_playing(&self) -> bool {
        !self.paused && !self.ended
    }
}

/// What the page looks like at one poll tick
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub channel: Option<String>,
    /// `None` when the page has no media element
    pub media: Option<MediaState>,
}

impl PageSnapshot {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            channel: None,
            media: None,
        }
    }

    #[must_use]
    pub fn with_media(mut self, media: MediaState) -> Self {
        self.media = Some(media);
        self
    }

    /// Normalized host, or `None` for URLs without one
    #[must_use]
    pub fn host(&self) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        url.host_str().map(normalize_host)
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.media.is_some_and(|m| m.is_playing())
    }
}

/// Read-only view of the live page
pub trait PageProbe: Send + Sync {
    fn snapshot(&self) -> PageSnapshot;
}

/// Intervention panel rendering, owned by the page
pub trait OverlayView: Send + Sync {
    fn show(&self);
    fn remove(&self);
}

/// Lower-case and drop a leading `www.`
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let lower = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Exact match or subdomain of `domain`
#[must_use]
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Video watch route (`/watch` or `/shorts/...`)
#[must_use]
pub fn is_watch_view(url: &str) -> bool {
    let Ok(url) = Url::parse(url) else {
        return false;
    };
    let Some(host) = url.host_str().map(normalize_host) else {
        return false;
    };

    host_matches(&host, WATCH_DOMAIN)
        && (url.path() == "/watch" || url.path().starts_with("/shorts/"))
}

#[must_use]
pub fn is_blocked(settings: &Settings, host: &str) -> bool {
    settings
        .blocklist
        .iter()
        .map(|entry| normalize_host(entry))
        .any(|entry| !entry.is_empty() && host_matches(host, &entry))
}

#[must_use]
pub fn is_monitored(settings: &Settings, url: &str) -> bool {
    if settings.youtube_enabled && is_watch_view(url) {
        return true;
    }
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(normalize_host));
    host.is_some_and(|h| is_blocked(settings, &h))
}
