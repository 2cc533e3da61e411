use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";

/// Get the local data directory for focusorb.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("focusorb");
    Ok(path)
}

/// User configuration read from `config.toml`; every key is optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub visibility_interval_ms: u64,
    pub expiry_interval_ms: u64,
    pub navigation_interval_ms: u64,
    pub default_break_minutes: u32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            backend_url: focusorb_ai::backend::DEFAULT_BACKEND_URL.to_string(),
            request_timeout_secs: 10,
            visibility_interval_ms: 1000,
            expiry_interval_ms: 2000,
            navigation_interval_ms: 800,
            default_break_minutes: 5,
        }
    }
}

/// Poll periods and defaults for one page context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTimings {
    pub visibility: Duration,
    pub expiry: Duration,
    pub navigation: Duration,
    pub default_break_minutes: u32,
}

impl Default for PageTimings {
    fn default() -> Self {
        OrbConfig::default().page_timings()
    }
}

impl OrbConfig {
    /// Load `config.toml` from `data_dir`, falling back to defaults when absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error if `raw` is not valid TOML for this config
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn page_timings(&self) -> PageTimings {
        PageTimings {
            visibility: Duration::from_millis(self.visibility_interval_ms),
            expiry: Duration::from_millis(self.expiry_interval_ms),
            navigation: Duration::from_millis(self.navigation_interval_ms),
            default_break_minutes: self.default_break_minutes,
        }
    }
}
