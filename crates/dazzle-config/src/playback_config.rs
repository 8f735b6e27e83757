//! Playback behaviour settings

use serde::{Deserialize, Serialize};

/// Settings for the playback state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Steps dimmer than this (percent) are boosted while paused
    #[serde(default = "default_dim_threshold")]
    pub dim_threshold: u8,
    /// Brightness (percent) used while paused on a dim step
    #[serde(default = "default_inspection_percent")]
    pub inspection_percent: u8,
    /// Percent added or removed by one nudge key press
    #[serde(default = "default_nudge_step")]
    pub nudge_step: u8,
    /// Write the display's initial brightness back on stop
    #[serde(default)]
    pub restore_on_stop: bool,
}

fn default_dim_threshold() -> u8 {
    20
}

fn default_inspection_percent() -> u8 {
    80
}

fn default_nudge_step() -> u8 {
    1
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            dim_threshold: default_dim_threshold(),
            inspection_percent: default_inspection_percent(),
            nudge_step: default_nudge_step(),
            restore_on_stop: false,
        }
    }
}
