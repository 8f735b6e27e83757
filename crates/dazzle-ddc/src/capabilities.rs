//! MCCS capabilities strings
//!
//! Displays describe themselves with nested `key(value)` groups:
//!
//! ```text
//! (prot(monitor)type(LCD)model(ACER VG271U)cmds(01 02 03 07 0C F3)vcp(02 10 12 14(05 08 0B) 60(0F 11))mccs_ver(2.1))
//! ```
//!
//! Strings read off the wire can be truncated or carry bit errors, so
//! parsing never fails; whatever could not be read is left empty.

use crate::transport::{DdcError, DisplayHandle};

/// The parts of a capabilities string used for display selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayCapabilities {
    pub protocol: Option<String>,
    /// Display technology (`type`), e.g. `LCD`
    pub kind: Option<String>,
    pub model: Option<String>,
    pub mccs_version: Option<String>,
    /// Advertised VCP codes, without their value lists
    pub vcp_codes: Vec<u8>,
}

impl DisplayCapabilities {
    /// Request and parse the capabilities of `handle`
    pub fn read(handle: &DisplayHandle) -> Result<Self, DdcError> {
        let caps = handle.capabilities()?;
        Ok(Self::parse(&caps))
    }

    pub fn parse(caps: &str) -> Self {
        let mut parsed = Self::default();

        for (key, value) in groups(strip_outer(caps)) {
            let text = || Some(value.trim().to_string()).filter(|v| !v.is_empty());
            match key {
                "prot" => parsed.protocol = text(),
                "type" => parsed.kind = text(),
                "model" => parsed.model = text(),
                "mccs_ver" => parsed.mccs_version = text(),
                "vcp" => parsed.vcp_codes = top_level_codes(value),
                _ => {}
            }
        }

        if parsed.model.is_none() {
            tracing::debug!("No model in capabilities string");
        }
        parsed
    }

    /// Whether the display advertises VCP `code`
    pub fn supports(&self, code: u8) -> bool {
        self.vcp_codes.contains(&code)
    }
}

fn strip_outer(caps: &str) -> &str {
    let trimmed = caps.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    match trimmed.strip_prefix('(') {
        Some(inner) => inner.strip_suffix(')').unwrap_or(inner),
        None => trimmed,
    }
}

/// Top-level `key(value)` groups; an unterminated group ends the scan
fn groups(caps: &str) -> Vec<(&str, &str)> {
    let bytes = caps.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        if i == start {
            i += 1;
            continue;
        }
        if i >= bytes.len() || bytes[i] != b'(' {
            continue;
        }

        let open = i;
        let mut depth = 0usize;
        let mut close = None;
        for (j, &b) in bytes.iter().enumerate().skip(open) {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(j);
                        break;
                    }
                }
                _ => {}
            }
        }

        match close {
            Some(close) => {
                found.push((&caps[start..open], &caps[open + 1..close]));
                i = close + 1;
            }
            None => {
                tracing::debug!("Capabilities string cut off in {}(", &caps[start..open]);
                break;
            }
        }
    }

    found
}

/// Hex codes outside any nested value list
fn top_level_codes(list: &str) -> Vec<u8> {
    let mut codes = Vec::new();
    let mut token = String::new();
    let mut depth = 0usize;

    for c in list.chars() {
        match c {
            '(' => {
                push_code(&mut token, &mut codes);
                depth += 1;
            }
            ')' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() => push_code(&mut token, &mut codes),
            c if depth == 0 => token.push(c),
            _ => {}
        }
    }
    push_code(&mut token, &mut codes);

    codes
}

fn push_code(token: &mut String, codes: &mut Vec<u8>) {
    if token.is_empty() {
        return;
    }
    match u8::from_str_radix(token, 16) {
        Ok(code) => codes.push(code),
        Err(_) => tracing::trace!("Skipping VCP token {:?}", token),
    }
    token.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMonitor;
    use crate::transport::TransportConfig;
    use std::time::Duration;

    fn fast_config() -> TransportConfig {
        TransportConfig {
            command_interval: Duration::from_millis(1),
            reply_delay: Duration::ZERO,
            max_retries: 0,
            ..TransportConfig::default()
        }
    }

    const ACER: &str = "(prot(monitor)type(LCD)model(ACER VG271U)cmds(01 02 03 07 0C F3)\
                        vcp(02 10 12 14(05 08 0B) 60(0F 11) D6(01 04))mccs_ver(2.1))";

    #[test]
    fn test_parse_full_string() {
        let caps = DisplayCapabilities::parse(ACER);
        assert_eq!(caps.protocol.as_deref(), Some("monitor"));
        assert_eq!(caps.kind.as_deref(), Some("LCD"));
        assert_eq!(caps.model.as_deref(), Some("ACER VG271U"));
        assert_eq!(caps.mccs_version.as_deref(), Some("2.1"));
        assert_eq!(caps.vcp_codes, vec![0x02, 0x10, 0x12, 0x14, 0x60, 0xD6]);
        assert!(caps.supports(0x10));
        assert!(!caps.supports(0x05));
    }

    #[test]
    fn test_parse_without_outer_parens_and_padding() {
        let caps = DisplayCapabilities::parse("prot(monitor) model(U2720Q) vcp(10 6B)\0\0");
        assert_eq!(caps.model.as_deref(), Some("U2720Q"));
        assert_eq!(caps.vcp_codes, vec![0x10, 0x6B]);
    }

    #[test]
    fn test_parse_truncated_string() {
        let caps = DisplayCapabilities::parse("(prot(monitor)type(LCD)model(DELL P24");
        assert_eq!(caps.kind.as_deref(), Some("LCD"));
        assert_eq!(caps.model, None);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(DisplayCapabilities::parse(""), DisplayCapabilities::default());
        let caps = DisplayCapabilities::parse("(vcp(10 zz 1\u{fffd}2 6B))");
        assert_eq!(caps.vcp_codes, vec![0x10, 0x6B]);
    }

    #[test]
    fn test_read_from_display() {
        let monitor = MockMonitor::new("lcd").with_capabilities(ACER);
        let handle = DisplayHandle::new(monitor, fast_config());

        let caps = DisplayCapabilities::read(&handle).unwrap();
        assert_eq!(caps.model.as_deref(), Some("ACER VG271U"));
        assert!(caps.supports(0x10));
    }

    #[test]
    fn test_read_without_answer_times_out() {
        let handle = DisplayHandle::new(MockMonitor::new("lcd"), fast_config());
        assert!(matches!(
            DisplayCapabilities::read(&handle),
            Err(DdcError::Timeout)
        ));
    }
}
