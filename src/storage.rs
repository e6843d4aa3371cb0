// src/storage.rs

//! Where state blobs live, and the `load_state`/`save_state` boundary. Loading
//! and saving never fail from the caller's point of view: problems are logged
//! and the in-memory state stays authoritative.

use crate::config::EngineConfig;
use crate::database;
use crate::error::{EngineError, Result};
use crate::models::CoreAdaptiveState;
use crate::persistence::{deserialize_state, serialize_state};
use crate::repository;
use chrono::Utc;
use log::{error, info, warn};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A key/value store for serialized state blobs.
pub trait StateStorage {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, blob: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

// --- SQLite ---

pub struct SqliteStorage {
    db: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Database path: {:?}", path.as_ref());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection, creating the schema if needed.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        database::init_db(&conn)?;
        Ok(SqliteStorage { db: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| EngineError::Lock(e.to_string()))
    }

    /// Every stored key with its last write time (RFC 3339), newest first.
    pub fn keys(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        Ok(repository::list_state_keys(&conn)?)
    }
}

impl StateStorage for SqliteStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(repository::get_state_blob(&conn, key)?)
    }

    fn write(&self, key: &str, blob: &str) -> Result<()> {
        let conn = self.conn()?;
        Ok(repository::upsert_state_blob(&conn, key, blob, Utc::now())?)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        repository::delete_state_blob(&conn, key)?;
        Ok(())
    }
}

// --- In-memory ---

#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.blobs.lock().map_err(|e| EngineError::Lock(e.to_string()))
    }
}

impl StateStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs()?.get(key).cloned())
    }

    fn write(&self, key: &str, blob: &str) -> Result<()> {
        self.blobs()?.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.blobs()?.remove(key);
        Ok(())
    }
}

// --- Load / Save ---

/// Loads the state stored under `config.storage_key`. Missing, unreadable or
/// unparseable blobs all yield a fresh state.
pub fn load_state<S: StateStorage + ?Sized>(storage: &S, config: &EngineConfig) -> CoreAdaptiveState {
    let blob = match storage.read(&config.storage_key) {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            info!("[Store] No saved state under '{}', starting fresh", config.storage_key);
            return CoreAdaptiveState::new(config);
        }
        Err(e) => {
            error!("[Store] Failed to read state '{}': {}", config.storage_key, e);
            return CoreAdaptiveState::new(config);
        }
    };

    match deserialize_state(&blob, config) {
        Ok(state) => {
            info!(
                "[Store] Loaded '{}': {} answers, {} tracked questions",
                config.storage_key,
                state.total_questions_answered,
                state.question_history.len()
            );
            state
        }
        Err(e) => {
            warn!("[Store] Discarding unreadable state '{}': {}", config.storage_key, e);
            CoreAdaptiveState::new(config)
        }
    }
}

/// Best-effort save. Returns whether the blob was written.
pub fn save_state<S: StateStorage + ?Sized>(storage: &S, state: &CoreAdaptiveState, storage_key: &str) -> bool {
    let result = serialize_state(state).and_then(|blob| storage.write(storage_key, &blob));
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("[Store] Failed to save state '{}': {}", storage_key, e);
            false
        }
    }
}

/// Drops the stored blob and returns a fresh state.
pub fn reset_state<S: StateStorage + ?Sized>(storage: &S, config: &EngineConfig) -> CoreAdaptiveState {
    if let Err(e) = storage.remove(&config.storage_key) {
        error!("[Store] Failed to remove state '{}': {}", config.storage_key, e);
    } else {
        info!("[Store] Reset state '{}'", config.storage_key);
    }
    CoreAdaptiveState::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerLog, AnswerSignal};
    use crate::pedagogy::record_answer;
    use std::collections::HashMap;

    struct BrokenStorage;

    impl StateStorage for BrokenStorage {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Err(EngineError::Lock("unavailable".into()))
        }
        fn write(&self, _key: &str, _blob: &str) -> Result<()> {
            Err(EngineError::Lock("quota exceeded".into()))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(EngineError::Lock("unavailable".into()))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::with_defaults("storage-test", vec!["SEC1".into()], HashMap::new())
    }

    fn answered(c: &EngineConfig) -> CoreAdaptiveState {
        let a = AnswerLog::new("q1", "SEC1", AnswerSignal::Binary(true));
        record_answer(CoreAdaptiveState::new(c), c, &a, Utc::now())
    }

    #[test]
    fn memory_round_trip() {
        let c = config();
        let storage = MemoryStorage::new();
        assert_eq!(load_state(&storage, &c), CoreAdaptiveState::new(&c));

        let s = answered(&c);
        assert!(save_state(&storage, &s, &c.storage_key));
        assert_eq!(load_state(&storage, &c), s);
    }

    #[test]
    fn sqlite_round_trip_and_reset() {
        let c = config();
        let storage = SqliteStorage::open_in_memory().unwrap();
        let s = answered(&c);
        assert!(save_state(&storage, &s, &c.storage_key));
        assert_eq!(load_state(&storage, &c), s);
        assert_eq!(storage.keys().unwrap().len(), 1);

        let fresh = reset_state(&storage, &c);
        assert_eq!(fresh.total_questions_answered, 0);
        assert_eq!(storage.read(&c.storage_key).unwrap(), None);
    }

    #[test]
    fn malformed_blob_falls_back_to_fresh() {
        let c = config();
        let storage = MemoryStorage::new();
        storage.write(&c.storage_key, "{{{ definitely not json").unwrap();
        assert_eq!(load_state(&storage, &c), CoreAdaptiveState::new(&c));

        storage.write(&c.storage_key, r#"{"schemaVersion": 99}"#).unwrap();
        assert_eq!(load_state(&storage, &c), CoreAdaptiveState::new(&c));
    }

    #[test]
    fn blob_with_out_of_range_dates_loads() {
        let c = config();
        let storage = MemoryStorage::new();
        let blob = r#"{"questionHistory":[["q1",{"attempts":1,"correctCount":1,"lastResult":true,
            "lastAttempted":"+262142-12-31T00:00:00Z","easeFactor":2.5,"interval":36500}]]}"#;
        storage.write(&c.storage_key, blob).unwrap();
        let state = load_state(&storage, &c);
        assert_eq!(state.question_history["q1"].attempts, 1);
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let c = config();
        let s = answered(&c);
        assert!(!save_state(&BrokenStorage, &s, &c.storage_key));
        assert_eq!(load_state(&BrokenStorage, &c), CoreAdaptiveState::new(&c));
        assert_eq!(reset_state(&BrokenStorage, &c), CoreAdaptiveState::new(&c));
    }

    #[test]
    fn works_through_a_trait_object() {
        let c = config();
        let storage: Box<dyn StateStorage> = Box::new(MemoryStorage::new());
        let s = answered(&c);
        assert!(save_state(storage.as_ref(), &s, &c.storage_key));
        assert_eq!(load_state(storage.as_ref(), &c), s);
    }
}
