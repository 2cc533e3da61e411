use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::models::Settings;
use crate::KeyValueStore;

/// Typed access to the persisted settings singleton
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Write defaults for every key, keeping values that already exist
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written
    pub fn seed_defaults(&self) -> Result<Settings> {
        let existing = self.store.get_all()?;
        let preserved = existing.len();

        let mut merged = Settings::default().to_map()?;
        merged.extend(existing);

        self.store.set(merged.clone())?;
        log::info!("Seeded settings defaults ({preserved} existing keys kept)");
        Settings::from_map(merged)
    }

    /// Load the full settings record
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds malformed values
    pub fn load(&self) -> Result<Settings> {
        Settings::from_map(self.store.get_all()?)
    }

    /// Read a subset of keys as raw values
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    pub fn fields(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        self.store.get(keys)
    }

    /// Write a partial update; keys not present in `patch` are untouched
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written
    pub fn merge(&self, patch: Map<String, Value>) -> Result<()> {
        self.store.set(patch)
    }
}
