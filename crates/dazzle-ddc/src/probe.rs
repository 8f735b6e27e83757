//! Display capability probe
//!
//! Decides once per session whether the display supports the brightness
//! feature and what range it reports. A display that fails the probe is
//! still a valid target for image-only testing.

use crate::transport::DisplayHandle;

/// What a display supports, derived once when the session opens it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub supports_backlight: bool,
    /// `(min, max)` in device-native units
    pub value_range: (u16, u16),
    /// VCP code used for brightness
    pub feature_code: u8,
    /// Value the display reported when probed
    pub initial_raw: Option<u16>,
}

impl Capability {
    /// Capability of a display without brightness control
    pub fn unsupported(feature_code: u8) -> Self {
        Self {
            supports_backlight: false,
            value_range: (0, 0),
            feature_code,
            initial_raw: None,
        }
    }

    pub fn min(&self) -> u16 {
        self.value_range.0
    }

    pub fn max(&self) -> u16 {
        self.value_range.1
    }
}

/// Probe `handle` for the brightness feature `feature_code`
///
/// Never fails: any transport error yields an unsupported capability.
pub fn probe(handle: &DisplayHandle, feature_code: u8) -> Capability {
    match handle.get_feature(feature_code) {
        Ok((_, 0)) => {
            tracing::warn!(
                "{} reports maximum 0 for feature {:#04x}, treating as unsupported",
                handle.name(),
                feature_code
            );
            Capability::unsupported(feature_code)
        }
        Ok((current, max)) => {
            tracing::info!(
                "{} supports backlight control (current {}, max {})",
                handle.name(),
                current,
                max
            );
            Capability {
                supports_backlight: true,
                value_range: (0, max),
                feature_code,
                initial_raw: Some(current.min(max)),
            }
        }
        Err(e) => {
            tracing::warn!(
                "{} does not support backlight control: {}",
                handle.name(),
                e
            );
            Capability::unsupported(feature_code)
        }
    }
}
