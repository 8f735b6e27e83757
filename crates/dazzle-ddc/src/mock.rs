//! Simulated DDC/CI monitor for testing without real hardware
//!
//! [`MockMonitor`] speaks the display side of the protocol: it validates
//! request checksums, answers Get VCP Feature and Capabilities requests and
//! applies Set VCP Feature writes. Faults can be queued to exercise retry
//! paths.
//!
//! # Usage
//!
//! ```no_run
//! use dazzle_ddc::mock::{Fault, MockMonitor};
//! use dazzle_ddc::{DisplayHandle, TransportConfig};
//!
//! let monitor = MockMonitor::new("Mock LCD").with_feature(0x10, 30, 100);
//! monitor.inject(Fault::Nack);
//!
//! let handle = DisplayHandle::new(monitor.clone(), TransportConfig::default());
//! assert_eq!(handle.get_feature(0x10).unwrap(), (30, 100));
//! ```

use crate::transport::{
    CAPS_CMD, CAPS_REPLY, DISPLAY_ADDR, DdcChannel, GET_VCP_CMD, GET_VCP_REPLY, HOST_ADDR,
    PROTOCOL_FLAG, SET_VCP_CMD, VCP_LUMINANCE, checksum, encode_reply,
};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Capabilities bytes per reply
const CAPS_FRAGMENT: usize = 32;

/// A failure the monitor applies to the next command it receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the write (address not acknowledged)
    Nack,
    /// Answer with a corrupted checksum
    CorruptChecksum,
    /// Accept the write but never answer
    NoReply,
    /// Answer with a DDC/CI null message
    NullReply,
}

/// A command as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCommandKind {
    Get { code: u8 },
    Set { code: u8, value: u16 },
    Capabilities { offset: u16 },
}

#[derive(Debug, Clone, Copy)]
pub struct MockCommand {
    pub at: Instant,
    pub kind: MockCommandKind,
}

/// Shared monitor state for inspection in tests
#[derive(Debug, Default)]
pub struct MockMonitorState {
    /// Supported features: code -> (current, max)
    pub features: HashMap<u8, (u16, u16)>,
    /// Faults applied to upcoming commands, one per command
    pub faults: VecDeque<Fault>,
    /// Every command that reached the monitor, in order
    pub commands: Vec<MockCommand>,
    /// Capabilities string; requests go unanswered without one
    pub capabilities: Option<String>,
    pending_reply: Option<Vec<u8>>,
}

/// Simulated monitor implementing [`DdcChannel`]
///
/// Clones share state, so a test can keep one clone for inspection while
/// the transport owns another.
#[derive(Debug, Clone)]
pub struct MockMonitor {
    name: String,
    state: Arc<RwLock<MockMonitorState>>,
}

impl MockMonitor {
    /// A monitor supporting luminance at 50 of 100
    pub fn new(name: &str) -> Self {
        let mut state = MockMonitorState::default();
        state.features.insert(VCP_LUMINANCE, (50, 100));

        Self {
            name: name.to_string(),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Add or replace a supported feature
    pub fn with_feature(self, code: u8, current: u16, max: u16) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.features.insert(code, (current, max));
        }
        self
    }

    /// Remove a feature so Get requests report it unsupported
    pub fn without_feature(self, code: u8) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.features.remove(&code);
        }
        self
    }

    /// Answer Capabilities requests with `caps`
    pub fn with_capabilities(self, caps: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.capabilities = Some(caps.to_string());
        }
        self
    }

    /// Queue a fault for the next command
    pub fn inject(&self, fault: Fault) {
        if let Ok(mut state) = self.state.write() {
            state.faults.push_back(fault);
        }
    }

    /// Current value of a feature
    pub fn value(&self, code: u8) -> Option<u16> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.features.get(&code).map(|(current, _)| *current))
    }

    /// Values written with Set VCP Feature for `code`, in order
    pub fn writes(&self, code: u8) -> Vec<u16> {
        self.commands()
            .into_iter()
            .filter_map(|command| match command.kind {
                MockCommandKind::Set { code: written, value } if written == code => Some(value),
                _ => None,
            })
            .collect()
    }

    /// All commands received so far
    pub fn commands(&self) -> Vec<MockCommand> {
        self.state
            .read()
            .map(|s| s.commands.clone())
            .unwrap_or_default()
    }

    /// Get shared state for manipulation in tests
    pub fn state(&self) -> Arc<RwLock<MockMonitorState>> {
        Arc::clone(&self.state)
    }
}

impl MockMonitorState {
    fn handle_request(&mut self, data: &[u8]) -> io::Result<()> {
        self.pending_reply = None;
        let fault = self.faults.pop_front();

        if fault == Some(Fault::Nack) {
            tracing::debug!("[MOCK] NACK");
            return Err(io::Error::from_raw_os_error(libc::EREMOTEIO));
        }

        // A real display silently drops malformed requests
        if data.len() < 4 || data[0] != HOST_ADDR || data[1] & PROTOCOL_FLAG == 0 {
            return Ok(());
        }
        let length = (data[1] & !PROTOCOL_FLAG) as usize;
        if data.len() != length + 3 || checksum(DISPLAY_ADDR, &data[..length + 2]) != data[length + 2] {
            tracing::debug!("[MOCK] Dropping request with bad framing");
            return Ok(());
        }

        let payload = &data[2..length + 2];
        let reply = match (payload[0], payload.len()) {
            (GET_VCP_CMD, 2) => {
                let code = payload[1];
                self.record(MockCommandKind::Get { code });
                let (result, current, max) = match self.features.get(&code) {
                    Some(&(current, max)) => (0, current, max),
                    None => (1, 0, 0),
                };
                let [max_hi, max_lo] = max.to_be_bytes();
                let [cur_hi, cur_lo] = current.to_be_bytes();
                Some(encode_reply(&[
                    GET_VCP_REPLY,
                    result,
                    code,
                    0x00,
                    max_hi,
                    max_lo,
                    cur_hi,
                    cur_lo,
                ]))
            }
            (SET_VCP_CMD, 4) => {
                let code = payload[1];
                let value = u16::from_be_bytes([payload[2], payload[3]]);
                self.record(MockCommandKind::Set { code, value });
                if let Some((current, max)) = self.features.get_mut(&code) {
                    *current = value.min(*max);
                    tracing::debug!("[MOCK] Feature {:#04x} set to {}", code, current);
                }
                None
            }
            (CAPS_CMD, 3) => {
                let offset = u16::from_be_bytes([payload[1], payload[2]]);
                self.record(MockCommandKind::Capabilities { offset });
                self.capabilities.as_ref().map(|caps| {
                    let bytes = caps.as_bytes();
                    let start = (offset as usize).min(bytes.len());
                    let end = (start + CAPS_FRAGMENT).min(bytes.len());
                    let mut fragment = vec![CAPS_REPLY, payload[1], payload[2]];
                    fragment.extend_from_slice(&bytes[start..end]);
                    encode_reply(&fragment)
                })
            }
            _ => None,
        };

        self.pending_reply = match (fault, reply) {
            (Some(Fault::NoReply), _) => None,
            (Some(Fault::NullReply), Some(_)) => Some(encode_reply(&[])),
            (Some(Fault::CorruptChecksum), Some(mut reply)) => {
                if let Some(last) = reply.last_mut() {
                    *last ^= 0xFF;
                }
                Some(reply)
            }
            (_, reply) => reply,
        };

        Ok(())
    }

    fn record(&mut self, kind: MockCommandKind) {
        self.commands.push(MockCommand {
            at: Instant::now(),
            kind,
        });
    }
}

impl DdcChannel for MockMonitor {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| io::Error::other("mock state poisoned"))?;
        state.handle_request(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .write()
            .map_err(|_| io::Error::other("mock state poisoned"))?;
        match state.pending_reply.take() {
            Some(reply) => {
                let len = reply.len().min(buf.len());
                buf[..len].copy_from_slice(&reply[..len]);
                Ok(len)
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "no reply")),
        }
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}
