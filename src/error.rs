// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported state schema version {0}")]
    UnsupportedSchema(u32),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("storage lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
