use anyhow::Result;
use rusqlite::Connection;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if table creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Flat key-value table; values are JSON-encoded
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}
