// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// settle_delay_ms = 100
/// poll_timeout_ms = 250
/// max_tokens = 1024
/// ```
///
/// All sections and keys are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Engine tuning from `[watch]`.
    #[serde(default)]
    pub watch: WatchConfig,
}

/// `[watch]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WatchConfig {
    /// How long a freshly watched directory is left to settle before the
    /// catch-up scan lists it.
    ///
    /// Only affects how quickly content written during registration is
    /// reported, not whether it is reported.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Upper bound on a single wait of the poll loop.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Maximum number of token identifiers the engine may issue.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_poll_timeout_ms() -> u64 {
    250
}

fn default_max_tokens() -> u32 {
    u32::MAX
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl WatchConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
