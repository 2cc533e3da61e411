pub mod db;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod settings;

use anyhow::Result;
use serde_json::{Map, Value};

pub use db::Database;
pub use memory::MemoryStore;
pub use models::{keys, LastDecision, Settings};
pub use settings::SettingsStore;

/// Flat key-value persistence backing the settings singleton.
///
/// Values are arbitrary JSON; keys that are absent from the store are simply
/// missing from the returned map.
pub trait KeyValueStore: Send + Sync {
    /// Read the given keys
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>>;

    /// Read every stored key
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read
    fn get_all(&self) -> Result<Map<String, Value>>;

    /// Write all given keys, replacing existing values
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written
    fn set(&self, values: Map<String, Value>) -> Result<()>;
}
