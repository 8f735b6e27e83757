//! DDC/CI channel settings

use serde::{Deserialize, Serialize};

/// Handling of reply checksum mismatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumMode {
    #[default]
    Strict,
    Warn,
    Ignore,
}

/// Settings for the display command channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdcConfig {
    /// VCP code driven as "backlight"
    #[serde(default = "default_feature_code")]
    pub feature_code: u8,
    /// I2C bus number; discovered when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<u32>,
    /// Minimum delay between commands in milliseconds
    #[serde(default = "default_command_interval")]
    pub command_interval_ms: u64,
    /// Delay before reading a reply in milliseconds
    #[serde(default = "default_reply_delay")]
    pub reply_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff unit between retries in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub checksum: ChecksumMode,
}

fn default_feature_code() -> u8 {
    0x10
}

fn default_command_interval() -> u64 {
    50
}

fn default_reply_delay() -> u64 {
    40
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    25
}

impl Default for DdcConfig {
    fn default() -> Self {
        Self {
            feature_code: default_feature_code(),
            bus: None,
            command_interval_ms: default_command_interval(),
            reply_delay_ms: default_reply_delay(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            checksum: ChecksumMode::default(),
        }
    }
}
