//! DDC/CI display control
//!
//! Talks to external monitors over the DDC/CI side channel of their video
//! cable (exposed by Linux as `/dev/i2c-N`) to read and write VCP features,
//! and maps the brightness feature onto a 0-100 percentage.
//!
//! # Example
//!
//! ```no_run
//! use dazzle_ddc::{BacklightControl, BacklightController, TransportConfig, VCP_LUMINANCE};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let handle = Arc::new(dazzle_ddc::open_display(4, TransportConfig::default())?);
//!     let mut backlight = BacklightController::open(handle, VCP_LUMINANCE);
//!     if backlight.capability().supports_backlight {
//!         backlight.set_backlight(80)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod backlight;
pub mod capabilities;
pub mod i2c;
pub mod mock;
pub mod probe;
pub mod transport;

pub use backlight::{
    BacklightControl, BacklightController, BacklightError, percent_to_raw, raw_to_percent,
};
pub use capabilities::DisplayCapabilities;
pub use i2c::{DiscoveredBus, I2cChannel, discover, list_buses, open_display};
pub use probe::{Capability, probe};
pub use transport::{
    ChecksumPolicy, DdcChannel, DdcError, DisplayHandle, TransportConfig, VCP_BACKLIGHT_WHITE,
    VCP_LUMINANCE,
};

/// DDC Result type
pub type Result<T> = std::result::Result<T, DdcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn luminance(handle: &DisplayHandle) -> Result<u16> {
        let (current, _) = handle.get_feature(VCP_LUMINANCE)?;
        Ok(current)
    }

    #[test]
    fn test_result_alias_carries_ddc_error() {
        let config = TransportConfig {
            command_interval: Duration::from_millis(1),
            reply_delay: Duration::ZERO,
            max_retries: 0,
            ..TransportConfig::default()
        };
        let monitor = mock::MockMonitor::new("lcd");
        let handle = DisplayHandle::new(monitor.clone(), config);
        assert_eq!(luminance(&handle).unwrap(), 50);

        monitor.inject(mock::Fault::NoReply);
        assert!(matches!(luminance(&handle), Err(DdcError::Timeout)));
    }
}
