use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::migrations;
use crate::KeyValueStore;

/// SQLite-backed key-value store
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file
    ///
    /// # Errors
    ///
    /// Returns an error if database directory creation, connection opening, or schema initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        migrations::init_schema(&conn)?;

        log::info!("Database initialized at: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a throwaway in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrations::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("focusorb");
        path.push("focusorb.db");
        path
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))
    }
}

fn decode(key: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Corrupted value stored under '{key}'"))
}

impl KeyValueStore for Database {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;

        let mut values = Map::new();
        for key in keys {
            let raw: Option<String> = stmt
                .query_row(params![key], |row| row.get(0))
                .optional()?;
            if let Some(raw) = raw {
                values.insert((*key).to_string(), decode(key, &raw)?);
            }
        }
        Ok(values)
    }

    fn get_all(&self) -> Result<Map<String, Value>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT key, value FROM kv_store ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut values = Map::new();
        for (key, raw) in rows {
            let value = decode(&key, &raw)?;
            values.insert(key, value);
        }
        Ok(values)
    }

    fn set(&self, values: Map<String, Value>) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for (key, value) in &values {
            tx.execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value.to_string()],
            )?;
        }
        tx.commit().context("Failed to commit settings write")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_set_then_get() {
        let db = Database::in_memory().unwrap();
        db.set(map(json!({"enabled": true, "breakHost": "youtube.com"})))
            .unwrap();

        let values = db.get(&["enabled", "breakHost"]).unwrap();
        assert_eq!(values["enabled"], json!(true));
        assert_eq!(values["breakHost"], json!("youtube.com"));
    }

    #[test]
    fn test_missing_keys_are_omitted() {
        let db = Database::in_memory().unwrap();
        db.set(map(json!({"enabled": false}))).unwrap();

        let values = db.get(&["enabled", "breakUntil"]).unwrap();
        assert_eq!(values.len(), 1);
        assert!(!values.contains_key("breakUntil"));
    }

    #[test]
    fn test_set_overwrites_existing_value() {
        let db = Database::in_memory().unwrap();
        db.set(map(json!({"breakUntil": 1000}))).unwrap();
        db.set(map(json!({"breakUntil": 2000}))).unwrap();

        let values = db.get_all().unwrap();
        assert_eq!(values["breakUntil"], json!(2000));
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("focusorb.db");

        {
            let db = Database::new(Some(path.clone())).unwrap();
            db.set(map(json!({"blocklist": ["reddit.com"], "lastDecision": null})))
                .unwrap();
        }

        let db = Database::new(Some(path)).unwrap();
        let values = db.get_all().unwrap();
        assert_eq!(values["blocklist"], json!(["reddit.com"]));
        assert_eq!(values["lastDecision"], Value::Null);
    }
}
