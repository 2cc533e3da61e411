use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::Mutex;

use crate::KeyValueStore;

/// Non-persistent store, used for ephemeral runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `values`
    #[must_use]
    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Map<String, Value>>> {
        self.values
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let values = self.lock()?;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    fn get_all(&self) -> Result<Map<String, Value>> {
        Ok(self.lock()?.clone())
    }

    fn set(&self, values: Map<String, Value>) -> Result<()> {
        self.lock()?.extend(values);
        Ok(())
    }
}
