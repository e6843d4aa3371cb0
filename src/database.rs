// src/database.rs

use log::debug;
use rusqlite::{Connection, Result};

/// Creates the state-blob table if needed. One row per storage key.
pub fn init_db(conn: &Connection) -> Result<()> {
    debug!("[DB] init_db: Checking database schema...");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS adaptive_state (
            storage_key TEXT PRIMARY KEY NOT NULL,
            blob TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        ",
    )?;

    let count: i64 = conn.query_row("SELECT count(*) FROM adaptive_state", [], |row| row.get(0))?;
    debug!("[DB] init_db: {} stored state(s)", count);

    Ok(())
}
