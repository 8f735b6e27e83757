//! Backlight control
//!
//! Maps operator percentages (0-100) onto the device-native range reported
//! by the probe and drives the transport. Displays without brightness
//! support answer every call with [`BacklightError::Unsupported`].

use crate::probe::{Capability, probe};
use crate::transport::{DdcError, DisplayHandle};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacklightError {
    #[error("Backlight control is not supported by this display")]
    Unsupported,

    #[error("Backlight hardware error: {0}")]
    Hardware(#[from] DdcError),
}

/// Backlight operations used by playback
///
/// Implemented by [`BacklightController`]; tests substitute recorders.
pub trait BacklightControl: Send {
    /// Capability probed for the display
    fn capability(&self) -> &Capability;

    /// Set the backlight to `percent` (clamped to 100)
    fn set_backlight(&mut self, percent: u8) -> Result<(), BacklightError>;

    /// Read the backlight back as a percentage
    fn get_backlight(&mut self) -> Result<u8, BacklightError>;

    /// Backlight the display had when the session opened it
    fn initial_backlight(&self) -> Option<u8> {
        let capability = self.capability();
        capability
            .initial_raw
            .filter(|_| capability.supports_backlight)
            .map(|raw| raw_to_percent(raw, capability.value_range))
    }

    /// Write the backlight captured at open back to the display
    fn restore_initial(&mut self) -> Result<(), BacklightError> {
        let percent = self.initial_backlight().ok_or(BacklightError::Unsupported)?;
        self.set_backlight(percent)
    }
}

/// Backlight controller bound to one display
#[derive(Debug)]
pub struct BacklightController {
    handle: Option<Arc<DisplayHandle>>,
    capability: Capability,
}

impl BacklightController {
    /// Create a controller from an already probed capability
    pub fn new(handle: Arc<DisplayHandle>, capability: Capability) -> Self {
        Self {
            handle: Some(handle),
            capability,
        }
    }

    /// Probe `handle` and create a controller for it
    pub fn open(handle: Arc<DisplayHandle>, feature_code: u8) -> Self {
        let capability = probe(&handle, feature_code);
        Self::new(handle, capability)
    }

    /// Controller for a session without any DDC/CI display
    pub fn detached(feature_code: u8) -> Self {
        Self {
            handle: None,
            capability: Capability::unsupported(feature_code),
        }
    }

    pub fn handle(&self) -> Option<&Arc<DisplayHandle>> {
        self.handle.as_ref()
    }

    fn supported_handle(&self) -> Result<&DisplayHandle, BacklightError> {
        match &self.handle {
            Some(handle) if self.capability.supports_backlight => Ok(handle),
            _ => Err(BacklightError::Unsupported),
        }
    }
}

impl BacklightControl for BacklightController {
    fn capability(&self) -> &Capability {
        &self.capability
    }

    fn set_backlight(&mut self, percent: u8) -> Result<(), BacklightError> {
        let handle = self.supported_handle()?;
        let raw = percent_to_raw(percent, self.capability.value_range);
        handle.set_feature(self.capability.feature_code, raw)?;
        tracing::debug!("Backlight set to {}% (raw {})", percent.min(100), raw);
        Ok(())
    }

    fn get_backlight(&mut self) -> Result<u8, BacklightError> {
        let handle = self.supported_handle()?;
        let (raw, _) = handle.get_feature(self.capability.feature_code)?;
        Ok(raw_to_percent(raw, self.capability.value_range))
    }

    /// Writes the probed device value itself, not its percentage
    fn restore_initial(&mut self) -> Result<(), BacklightError> {
        let handle = self.supported_handle()?;
        let raw = self
            .capability
            .initial_raw
            .ok_or(BacklightError::Unsupported)?;
        handle.set_feature(self.capability.feature_code, raw)?;
        tracing::debug!("Backlight restored to raw {}", raw);
        Ok(())
    }
}

/// Map a percentage onto `[min, max]`, rounding half to even
pub fn percent_to_raw(percent: u8, (min, max): (u16, u16)) -> u16 {
    let span = max.saturating_sub(min) as u32;
    let scaled = div_round_half_even(percent.min(100) as u32 * span, 100);
    min + scaled as u16
}

/// Map a device value back to a percentage, rounding half to even
pub fn raw_to_percent(raw: u16, (min, max): (u16, u16)) -> u8 {
    let span = max.saturating_sub(min) as u32;
    if span == 0 {
        return 0;
    }
    let offset = (raw.clamp(min, max) - min) as u32;
    div_round_half_even(offset * 100, span) as u8
}

fn div_round_half_even(numerator: u32, denominator: u32) -> u32 {
    let quotient = numerator / denominator;
    let twice_remainder = 2 * (numerator % denominator);
    if twice_remainder > denominator || (twice_remainder == denominator && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}
