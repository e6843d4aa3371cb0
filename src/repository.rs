// src/repository.rs

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Result};

/// Fetches the blob stored under `storage_key`, if any.
pub fn get_state_blob(conn: &Connection, storage_key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT blob FROM adaptive_state WHERE storage_key = ?",
        [storage_key],
        |row| row.get(0),
    )
    .optional()
}

/// Inserts or replaces the blob for `storage_key`.
pub fn upsert_state_blob(conn: &Connection, storage_key: &str, blob: &str, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO adaptive_state (storage_key, blob, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(storage_key) DO UPDATE SET blob = excluded.blob, updated_at = excluded.updated_at",
        params![storage_key, blob, now.to_rfc3339()],
    )?;
    debug!("[DB] Stored {} byte(s) under '{}'", blob.len(), storage_key);
    Ok(())
}

/// Returns true when a row was removed.
pub fn delete_state_blob(conn: &Connection, storage_key: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM adaptive_state WHERE storage_key = ?", [storage_key])?;
    Ok(removed > 0)
}

/// All storage keys with the time each was last written, newest first.
pub fn list_state_keys(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT storage_key, updated_at FROM adaptive_state ORDER BY updated_at DESC")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<(String, String)>, _>>()?;
    Ok(rows)
}
