//! DDC/CI command transport
//!
//! Frames Get/Set VCP Feature messages, validates replies and serializes all
//! traffic for one display behind a single lock. The underlying channel is
//! not reentrant, so a second caller waits until the first exchange
//! (including its retries) has finished.

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// I2C slave address of the display's DDC/CI endpoint
pub const DDCCI_ADDR: u8 = 0x37;
/// Virtual source address of the host
pub const HOST_ADDR: u8 = 0x51;
/// Source address used by the display in replies (`DDCCI_ADDR << 1`)
pub const DISPLAY_ADDR: u8 = DDCCI_ADDR << 1;
/// Seed XORed into reply checksums (virtual host address on the bus)
pub const REPLY_CHECKSUM_SEED: u8 = 0x50;
/// Bit 7 of the length byte
pub const PROTOCOL_FLAG: u8 = 0x80;

pub const GET_VCP_CMD: u8 = 0x01;
pub const GET_VCP_REPLY: u8 = 0x02;
pub const SET_VCP_CMD: u8 = 0x03;
pub const CAPS_CMD: u8 = 0xF3;
pub const CAPS_REPLY: u8 = 0xE3;

/// Full Get VCP Feature reply: source, length, 8 payload bytes, checksum
pub const GET_VCP_REPLY_LEN: usize = 11;
/// Longest Capabilities Reply: source, length, opcode, offset, 32 data bytes, checksum
pub const CAPS_REPLY_MAX_LEN: usize = 38;
/// Fragments read before a capabilities string is cut off
const CAPS_FRAGMENT_LIMIT: usize = 40;

/// Luminance (display brightness) VCP code
pub const VCP_LUMINANCE: u8 = 0x10;
/// White backlight level VCP code
pub const VCP_BACKLIGHT_WHITE: u8 = 0x6B;

#[derive(Debug, Error)]
pub enum DdcError {
    #[error("No reply from display (timed out)")]
    Timeout,

    #[error("Display did not acknowledge the command")]
    Nack,

    #[error("Reply checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Value {value} exceeds maximum {max} for feature {code:#04x}")]
    InvalidValue { code: u8, value: u16, max: u16 },

    #[error("Feature {0:#04x} is not supported by the display")]
    Unsupported(u8),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DdcError {
    /// Transient wire failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DdcError::Timeout | DdcError::Nack | DdcError::ChecksumMismatch { .. }
        )
    }
}

/// What to do when a reply checksum does not match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Reject the reply with [`DdcError::ChecksumMismatch`]
    #[default]
    Strict,
    /// Log a warning and accept the reply
    Warn,
    /// Accept the reply silently
    Ignore,
}

/// Timing and retry settings for a display channel
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Minimum delay between two consecutive commands
    pub command_interval: Duration,
    /// Delay between a Get request and reading its reply
    pub reply_delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff unit; retry `n` waits `command_interval + n * retry_backoff`
    pub retry_backoff: Duration,
    pub checksum: ChecksumPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command_interval: Duration::from_millis(50),
            reply_delay: Duration::from_millis(40),
            max_retries: 3,
            retry_backoff: Duration::from_millis(25),
            checksum: ChecksumPolicy::Strict,
        }
    }
}

/// Raw byte channel to a display (an I2C bus, or a simulated monitor)
pub trait DdcChannel: Send {
    /// Write one complete message
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read one reply into `buf`, returning the number of bytes read
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Human-readable channel description for logs
    fn describe(&self) -> String;
}

struct HandleInner {
    channel: Box<dyn DdcChannel>,
    last_command: Option<Instant>,
    known_max: HashMap<u8, u16>,
}

impl HandleInner {
    fn wait_for_interval(&self, interval: Duration) {
        if let Some(last) = self.last_command {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
    }
}

/// An opened display and its command channel
///
/// All operations on a handle are mutually exclusive. Commands issued faster
/// than [`TransportConfig::command_interval`] are delayed, never dropped.
pub struct DisplayHandle {
    name: String,
    config: TransportConfig,
    inner: Mutex<HandleInner>,
}

impl DisplayHandle {
    /// Wrap a channel into a handle
    pub fn new(channel: impl DdcChannel + 'static, config: TransportConfig) -> Self {
        let name = channel.describe();
        Self {
            name,
            config,
            inner: Mutex::new(HandleInner {
                channel: Box::new(channel),
                last_command: None,
                known_max: HashMap::new(),
            }),
        }
    }

    /// Channel description
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport settings in use
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Maximum reported by the last successful read of `code`
    pub fn known_max(&self, code: u8) -> Option<u16> {
        self.lock().known_max.get(&code).copied()
    }

    /// Read a VCP feature, returning `(current, max)`
    pub fn get_feature(&self, code: u8) -> Result<(u16, u16), DdcError> {
        let request = encode_request(&[GET_VCP_CMD, code]);
        let checksum = self.config.checksum;
        let reply_delay = self.config.reply_delay;
        let name = self.name.clone();

        self.exchange("get", code, |inner| {
            tracing::debug!("{} get {:#04x}: {}", name, code, hex(&request));
            inner.channel.write(&request).map_err(classify_write_error)?;

            thread::sleep(reply_delay);

            let mut reply = [0u8; GET_VCP_REPLY_LEN];
            let read = inner.channel.read(&mut reply).map_err(|e| {
                tracing::debug!("{} read failed: {}", name, e);
                DdcError::Timeout
            })?;
            tracing::debug!("{} reply: {}", name, hex(&reply[..read]));

            let (current, max) = decode_get_reply(&reply[..read], code, checksum)?;
            inner.known_max.insert(code, max);
            Ok((current, max))
        })
    }

    /// Write a VCP feature
    ///
    /// Fails with [`DdcError::InvalidValue`] without touching the wire when
    /// `value` exceeds the maximum previously read for `code`.
    pub fn set_feature(&self, code: u8, value: u16) -> Result<(), DdcError> {
        if let Some(max) = self.known_max(code)
            && value > max
        {
            return Err(DdcError::InvalidValue { code, value, max });
        }

        let [hi, lo] = value.to_be_bytes();
        let request = encode_request(&[SET_VCP_CMD, code, hi, lo]);
        let name = self.name.clone();

        self.exchange("set", code, |inner| {
            tracing::debug!("{} set {:#04x}={}: {}", name, code, value, hex(&request));
            inner.channel.write(&request).map_err(classify_write_error)
        })
    }

    /// Read the display's MCCS capabilities string
    ///
    /// The string arrives in fragments of up to 32 bytes, each one a full
    /// exchange with its own retries. An empty fragment ends it.
    pub fn capabilities(&self) -> Result<String, DdcError> {
        let checksum = self.config.checksum;
        let reply_delay = self.config.reply_delay;
        let name = &self.name;
        let mut caps: Vec<u8> = Vec::new();
        let mut complete = false;

        for _ in 0..CAPS_FRAGMENT_LIMIT {
            let offset = caps.len() as u16;
            let [hi, lo] = offset.to_be_bytes();
            let request = encode_request(&[CAPS_CMD, hi, lo]);

            let fragment = self.exchange("caps", CAPS_CMD, |inner| {
                tracing::debug!("{} caps at {}: {}", name, offset, hex(&request));
                inner.channel.write(&request).map_err(classify_write_error)?;

                thread::sleep(reply_delay);

                let mut reply = [0u8; CAPS_REPLY_MAX_LEN];
                let read = inner.channel.read(&mut reply).map_err(|e| {
                    tracing::debug!("{} read failed: {}", name, e);
                    DdcError::Timeout
                })?;
                decode_caps_reply(&reply[..read], offset, checksum).map(<[u8]>::to_vec)
            })?;

            if fragment.is_empty() {
                complete = true;
                break;
            }
            caps.extend_from_slice(&fragment);
        }

        if !complete {
            tracing::warn!(
                "{} capabilities cut off after {} bytes",
                self.name,
                caps.len()
            );
        }
        let caps = String::from_utf8_lossy(&caps)
            .trim_end_matches('\0')
            .to_string();
        tracing::debug!("{} capabilities: {}", self.name, caps);
        Ok(caps)
    }

    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one command under the handle lock with rate limiting and retry
    fn exchange<T>(
        &self,
        op: &str,
        code: u8,
        mut attempt_once: impl FnMut(&mut HandleInner) -> Result<T, DdcError>,
    ) -> Result<T, DdcError> {
        let mut inner = self.lock();
        let mut attempt: u32 = 0;
        let mut backoff = Duration::ZERO;

        loop {
            inner.wait_for_interval(self.config.command_interval + backoff);
            let result = attempt_once(&mut *inner);
            inner.last_command = Some(Instant::now());

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    backoff = self.config.retry_backoff * attempt;
                    tracing::warn!(
                        "{} {} {:#04x} failed ({}), retry {}/{} in {:?}",
                        self.name,
                        op,
                        code,
                        e,
                        attempt,
                        self.config.max_retries,
                        self.config.command_interval + backoff
                    );
                }
                Err(e) => {
                    if attempt > 0 {
                        tracing::warn!(
                            "{} {} {:#04x} gave up after {} retries: {}",
                            self.name,
                            op,
                            code,
                            attempt,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl std::fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// XOR checksum over `bytes`, starting from `seed`
pub fn checksum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, b| acc ^ b)
}

/// Frame a host-to-display message around `payload`
pub fn encode_request(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(payload.len() + 3);
    message.push(HOST_ADDR);
    message.push(payload.len() as u8 | PROTOCOL_FLAG);
    message.extend_from_slice(payload);
    message.push(checksum(DISPLAY_ADDR, &message));
    message
}

/// Frame a display-to-host reply around `payload`
pub fn encode_reply(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(payload.len() + 3);
    message.push(DISPLAY_ADDR);
    message.push(payload.len() as u8 | PROTOCOL_FLAG);
    message.extend_from_slice(payload);
    message.push(checksum(REPLY_CHECKSUM_SEED, &message));
    message
}

/// Parse a Get VCP Feature reply for `code` into `(current, max)`
pub fn decode_get_reply(
    reply: &[u8],
    code: u8,
    policy: ChecksumPolicy,
) -> Result<(u16, u16), DdcError> {
    let payload = verify_reply(reply, policy)?;
    if payload.len() < 8 || payload[0] != GET_VCP_REPLY {
        tracing::debug!("Unexpected reply opcode {:#04x}", payload[0]);
        return Err(DdcError::Nack);
    }
    if payload[2] != code {
        tracing::debug!("Reply for feature {:#04x}, expected {:#04x}", payload[2], code);
        return Err(DdcError::Nack);
    }

    match payload[1] {
        0 => {}
        1 => return Err(DdcError::Unsupported(code)),
        other => {
            tracing::debug!("Unknown result code {}", other);
            return Err(DdcError::Nack);
        }
    }

    let max = u16::from_be_bytes([payload[4], payload[5]]);
    let current = u16::from_be_bytes([payload[6], payload[7]]);
    Ok((current, max))
}

/// Parse a Capabilities Reply for `offset` into its data fragment
pub fn decode_caps_reply(
    reply: &[u8],
    offset: u16,
    policy: ChecksumPolicy,
) -> Result<&[u8], DdcError> {
    let payload = verify_reply(reply, policy)?;
    if payload.len() < 3 || payload[0] != CAPS_REPLY {
        tracing::debug!("Unexpected reply opcode {:#04x}", payload[0]);
        return Err(DdcError::Nack);
    }
    let echoed = u16::from_be_bytes([payload[1], payload[2]]);
    if echoed != offset {
        tracing::debug!("Capabilities fragment at {}, expected {}", echoed, offset);
        return Err(DdcError::Nack);
    }
    Ok(&payload[3..])
}

/// Check framing and checksum of a reply, returning its payload
fn verify_reply(reply: &[u8], policy: ChecksumPolicy) -> Result<&[u8], DdcError> {
    if reply.len() < 2 {
        return Err(DdcError::Timeout);
    }

    let length = (reply[1] & !PROTOCOL_FLAG) as usize;
    if length == 0 {
        // Null message: display busy or not ready
        return Err(DdcError::Nack);
    }
    if reply.len() < length + 3 {
        return Err(DdcError::Timeout);
    }

    let expected = checksum(REPLY_CHECKSUM_SEED, &reply[..length + 2]);
    let actual = reply[length + 2];
    if expected != actual {
        match policy {
            ChecksumPolicy::Strict => return Err(DdcError::ChecksumMismatch { expected, actual }),
            ChecksumPolicy::Warn => tracing::warn!(
                "Reply checksum mismatch: expected {:#04x}, got {:#04x}",
                expected,
                actual
            ),
            ChecksumPolicy::Ignore => {}
        }
    }

    Ok(&reply[2..length + 2])
}

/// A rejected write means the display did not ACK its address
fn classify_write_error(e: io::Error) -> DdcError {
    match e.raw_os_error() {
        Some(libc::EREMOTEIO) | Some(libc::ENXIO) | Some(libc::EIO) | Some(libc::EAGAIN) => {
            DdcError::Nack
        }
        _ if e.kind() == io::ErrorKind::TimedOut => DdcError::Timeout,
        _ => DdcError::Io(e),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_reply(result: u8, code: u8, max: u16, current: u16) -> Vec<u8> {
        let [max_hi, max_lo] = max.to_be_bytes();
        let [cur_hi, cur_lo] = current.to_be_bytes();
        encode_reply(&[GET_VCP_REPLY, result, code, 0x00, max_hi, max_lo, cur_hi, cur_lo])
    }

    #[test]
    fn test_encode_get_request() {
        let message = encode_request(&[GET_VCP_CMD, VCP_LUMINANCE]);
        assert_eq!(message, vec![0x51, 0x82, 0x01, 0x10, 0xAC]);
    }

    #[test]
    fn test_encode_set_request() {
        let message = encode_request(&[SET_VCP_CMD, VCP_LUMINANCE, 0x00, 0x32]);
        assert_eq!(&message[..6], &[0x51, 0x84, 0x03, 0x10, 0x00, 0x32]);
        assert_eq!(message[6], checksum(0x6E, &message[..6]));
    }

    #[test]
    fn test_decode_get_reply() {
        let reply = get_reply(0, VCP_LUMINANCE, 100, 42);
        assert_eq!(reply.len(), GET_VCP_REPLY_LEN);
        let (current, max) = decode_get_reply(&reply, VCP_LUMINANCE, ChecksumPolicy::Strict).unwrap();
        assert_eq!(current, 42);
        assert_eq!(max, 100);
    }

    #[test]
    fn test_decode_unsupported_result() {
        let reply = get_reply(1, VCP_LUMINANCE, 0, 0);
        let err = decode_get_reply(&reply, VCP_LUMINANCE, ChecksumPolicy::Strict).unwrap_err();
        assert!(matches!(err, DdcError::Unsupported(0x10)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_decode_null_message_is_nack() {
        let reply = encode_reply(&[]);
        let err = decode_get_reply(&reply, VCP_LUMINANCE, ChecksumPolicy::Strict).unwrap_err();
        assert!(matches!(err, DdcError::Nack));
    }

    #[test]
    fn test_decode_wrong_opcode_is_nack() {
        let reply = get_reply(0, 0x12, 100, 42);
        let err = decode_get_reply(&reply, VCP_LUMINANCE, ChecksumPolicy::Strict).unwrap_err();
        assert!(matches!(err, DdcError::Nack));
    }

    #[test]
    fn test_decode_short_reply_is_timeout() {
        let reply = get_reply(0, VCP_LUMINANCE, 100, 42);
        let err = decode_get_reply(&reply[..5], VCP_LUMINANCE, ChecksumPolicy::Strict).unwrap_err();
        assert!(matches!(err, DdcError::Timeout));
    }

    #[test]
    fn test_checksum_policies() {
        let mut reply = get_reply(0, VCP_LUMINANCE, 100, 42);
        let last = reply.len() - 1;
        reply[last] ^= 0xFF;

        let err = decode_get_reply(&reply, VCP_LUMINANCE, ChecksumPolicy::Strict).unwrap_err();
        assert!(matches!(err, DdcError::ChecksumMismatch { .. }));
        assert!(err.is_retryable());

        assert_eq!(
            decode_get_reply(&reply, VCP_LUMINANCE, ChecksumPolicy::Warn).unwrap(),
            (42, 100)
        );
        assert_eq!(
            decode_get_reply(&reply, VCP_LUMINANCE, ChecksumPolicy::Ignore).unwrap(),
            (42, 100)
        );
    }

    #[test]
    fn test_decode_caps_fragment() {
        let reply = encode_reply(&[CAPS_REPLY, 0x00, 0x20, b'(', b'p', b'r']);
        let fragment = decode_caps_reply(&reply, 32, ChecksumPolicy::Strict).unwrap();
        assert_eq!(fragment, b"(pr");

        let end = encode_reply(&[CAPS_REPLY, 0x00, 0x23]);
        assert!(decode_caps_reply(&end, 35, ChecksumPolicy::Strict).unwrap().is_empty());
    }

    #[test]
    fn test_decode_caps_wrong_offset_is_nack() {
        let reply = encode_reply(&[CAPS_REPLY, 0x00, 0x00, b'x']);
        let err = decode_caps_reply(&reply, 32, ChecksumPolicy::Strict).unwrap_err();
        assert!(matches!(err, DdcError::Nack));

        let get = encode_reply(&[GET_VCP_REPLY, 0, VCP_LUMINANCE, 0, 0, 100, 0, 50]);
        assert!(matches!(
            decode_caps_reply(&get, 0, ChecksumPolicy::Strict),
            Err(DdcError::Nack)
        ));
    }

    #[test]
    fn test_classify_write_error() {
        let nack = classify_write_error(io::Error::from_raw_os_error(libc::EREMOTEIO));
        assert!(matches!(nack, DdcError::Nack));

        let other = classify_write_error(io::Error::from_raw_os_error(libc::EBADF));
        assert!(matches!(other, DdcError::Io(_)));
    }

    #[test]
    fn test_default_transport_config() {
        let config = TransportConfig::default();
        assert_eq!(config.command_interval, Duration::from_millis(50));
        assert_eq!(config.reply_delay, Duration::from_millis(40));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.checksum, ChecksumPolicy::Strict);
    }
}
