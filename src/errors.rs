// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("token capacity exhausted: no identifiers left to issue")]
    CapacityExhausted,

    #[error("a directory pattern must be registered before file patterns")]
    NoDirectoryPattern,

    #[error("file pattern already registered: {0}")]
    DuplicateFilePattern(String),

    #[error("file pattern not registered: {0}")]
    FilePatternNotFound(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid path template: {0}")]
    InvalidTemplate(String),

    #[error("token {0} has been destroyed")]
    TokenDestroyed(u32),

    #[error("no Tokio runtime available to drive the watch engine")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("native watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchError>;
