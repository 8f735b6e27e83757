//! Linux I2C channel (`/dev/i2c-N`)
//!
//! Opens an i2c-dev bus, points it at the DDC/CI slave address and moves
//! raw message bytes. Discovery scans `/dev` for buses with a responsive
//! DDC/CI endpoint and asks each display for its model.

use crate::capabilities::DisplayCapabilities;
use crate::transport::{DDCCI_ADDR, DdcChannel, DdcError, DisplayHandle, TransportConfig};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

mod ioctl {
    // I2C_SLAVE from linux/i2c-dev.h
    nix::ioctl_write_int_bad!(i2c_set_slave_address, 0x0703);
}

/// An open i2c-dev bus addressed at the DDC/CI endpoint
#[derive(Debug)]
pub struct I2cChannel {
    bus: u32,
    path: PathBuf,
    file: File,
}

impl I2cChannel {
    /// Open `/dev/i2c-<bus>` and wake the display with a one-byte read
    pub fn open(bus: u32) -> Result<Self, DdcError> {
        let path = PathBuf::from(format!("/dev/i2c-{}", bus));
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        // SAFETY: the fd is valid for the lifetime of `file`, and I2C_SLAVE
        // takes the address by value.
        unsafe { ioctl::i2c_set_slave_address(file.as_raw_fd(), DDCCI_ADDR as libc::c_int) }
            .map_err(io::Error::from)?;

        let mut channel = Self { bus, path, file };

        // Some displays ignore the first transaction after idling
        let mut wake = [0u8; 1];
        channel.file.read_exact(&mut wake)?;

        tracing::debug!("Opened DDC/CI channel on {}", channel.path.display());
        Ok(channel)
    }

    pub fn bus(&self) -> u32 {
        self.bus
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DdcChannel for I2cChannel {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn describe(&self) -> String {
        format!("i2c-{}", self.bus)
    }
}

/// A bus with a responsive DDC/CI endpoint
#[derive(Debug, Clone)]
pub struct DiscoveredBus {
    pub bus: u32,
    pub path: PathBuf,
    /// Adapter name from sysfs (e.g. the GPU connector)
    pub adapter: String,
    /// Model from the display's capabilities string
    pub model: Option<String>,
}

impl DiscoveredBus {
    /// Model if the display reported one, otherwise the adapter
    pub fn label(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.adapter)
    }
}

/// Bus numbers of all i2c-dev nodes, sorted
pub fn list_buses() -> Result<Vec<u32>, DdcError> {
    let mut buses = Vec::new();

    let dev_dir = Path::new("/dev");
    for entry in fs::read_dir(dev_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(number) = name.strip_prefix("i2c-")
            && let Ok(bus) = number.parse::<u32>()
        {
            buses.push(bus);
        }
    }

    buses.sort_unstable();
    Ok(buses)
}

/// Probe every i2c bus for a DDC/CI endpoint
///
/// Each display found is asked for its capabilities string, paced by
/// `config`, to learn its model.
pub fn discover(config: &TransportConfig) -> Vec<DiscoveredBus> {
    let buses = match list_buses() {
        Ok(buses) => buses,
        Err(e) => {
            tracing::warn!("Unable to list I2C buses: {}", e);
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for bus in buses {
        match I2cChannel::open(bus) {
            Ok(channel) => {
                let path = channel.path().to_path_buf();
                let handle = DisplayHandle::new(channel, config.clone());
                let model = match DisplayCapabilities::read(&handle) {
                    Ok(caps) => caps.model,
                    Err(e) => {
                        tracing::debug!("i2c-{} did not report capabilities: {}", bus, e);
                        None
                    }
                };

                let discovered = DiscoveredBus {
                    bus,
                    path,
                    adapter: adapter_name(bus),
                    model,
                };
                tracing::info!(
                    "Found DDC/CI display on i2c-{}: {} ({})",
                    bus,
                    discovered.label(),
                    discovered.adapter
                );
                found.push(discovered);
            }
            Err(e) => tracing::debug!("i2c-{} is not DDC/CI capable: {}", bus, e),
        }
    }

    found
}

/// Open a bus and wrap it into a [`DisplayHandle`]
pub fn open_display(bus: u32, config: TransportConfig) -> Result<DisplayHandle, DdcError> {
    let channel = I2cChannel::open(bus)?;
    tracing::info!("Using DDC/CI display on i2c-{} ({})", bus, adapter_name(bus));
    Ok(DisplayHandle::new(channel, config))
}

fn adapter_name(bus: u32) -> String {
    let sysfs_path = format!("/sys/class/i2c-dev/i2c-{}/name", bus);
    fs::read_to_string(&sysfs_path)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "Unknown".to_string())
}
