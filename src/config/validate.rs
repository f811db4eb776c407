// src/config/validate.rs

use crate::config::model::{ConfigFile, WatchConfig};
use crate::errors::{Result, WatchError};

/// Longest accepted settle delay or poll timeout.
pub const MAX_DELAY_MS: u64 = 60_000;

pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_watch_config(&cfg.watch)
}

pub fn validate_watch_config(watch: &WatchConfig) -> Result<()> {
    if watch.settle_delay_ms > MAX_DELAY_MS {
        return Err(WatchError::Config(format!(
            "[watch].settle_delay_ms must be <= {MAX_DELAY_MS} (got {})",
            watch.settle_delay_ms
        )));
    }

    if watch.poll_timeout_ms == 0 || watch.poll_timeout_ms > MAX_DELAY_MS {
        return Err(WatchError::Config(format!(
            "[watch].poll_timeout_ms must be between 1 and {MAX_DELAY_MS} (got {})",
            watch.poll_timeout_ms
        )));
    }

    if watch.max_tokens == 0 {
        return Err(WatchError::Config(
            "[watch].max_tokens must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
