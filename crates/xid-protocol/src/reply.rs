//! Query reply parsing
//!
//! Most queries are answered with an echo of the query followed by the
//! value (`_f5` -> `_f5<ms>`); selector-based queries echo the selector too
//! (`_it3` -> `_it3<threshold>`). The identification queries `_d2`, `_d3`,
//! `_d4` and `_d5` answer with a single bare byte.

use tracing::debug;

use crate::command::{SignalFilter, SingleShotMode, XidCommand};
use crate::error::ParseError;

/// Remove the zero bytes a device in E-Prime/PST mode emits
pub fn strip_zeros(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().copied().filter(|&b| b != 0).collect()
}

/// Value bytes of a fixed-size reply, after the echoed prefix (and selector)
pub fn value_bytes<'a>(command: &XidCommand, reply: &'a [u8]) -> Result<&'a [u8], ParseError> {
    let expected = command.reply_len();
    if reply.len() < expected {
        return Err(ParseError::Incomplete {
            needed: expected - reply.len(),
        });
    }
    let reply = &reply[..expected];

    let Some(prefix) = command.reply_prefix() else {
        return Ok(reply);
    };
    if !reply.starts_with(prefix) {
        return Err(ParseError::InvalidReply(format!(
            "{} reply {:?} does not start with {:?}",
            command.name(),
            String::from_utf8_lossy(reply),
            String::from_utf8_lossy(prefix)
        )));
    }

    let skip = match command {
        XidCommand::GetMpodModel { .. }
        | XidCommand::GetMappedSignals { .. }
        | XidCommand::GetTimerResetOnOnset { .. }
        | XidCommand::GetTimestampedOutput { .. }
        | XidCommand::GetAnalogThreshold { .. }
        | XidCommand::GetMpodOutputMode { .. }
        | XidCommand::GetSingleShotMode { .. }
        | XidCommand::GetSignalFilter { .. }
        | XidCommand::GetEnableUsbOutput { .. } => prefix.len() + 1,
        _ => prefix.len(),
    };
    Ok(&reply[skip..])
}

/// Single raw byte value
pub fn byte_value(command: &XidCommand, reply: &[u8]) -> Result<u8, ParseError> {
    value_bytes(command, reply)?
        .first()
        .copied()
        .ok_or_else(|| ParseError::InvalidReply(format!("empty {} reply", command.name())))
}

/// ASCII digit value (`'0'` + n), checked against an inclusive maximum
pub fn digit_value(command: &XidCommand, reply: &[u8], max: u8) -> Result<u8, ParseError> {
    let raw = byte_value(command, reply)?;
    match raw.checked_sub(b'0') {
        Some(v) if v <= max => Ok(v),
        _ => Err(ParseError::InvalidReply(format!(
            "{} value 0x{:02X} outside '0'..='{}'",
            command.name(),
            raw,
            max
        ))),
    }
}

/// Little-endian u32 value (`_mp`, `e3`, `_e5`)
pub fn u32_value(command: &XidCommand, reply: &[u8]) -> Result<u32, ParseError> {
    let value = value_bytes(command, reply)?;
    let bytes: [u8; 4] = value
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| ParseError::InvalidReply(format!("short {} reply", command.name())))?;
    Ok(u32::from_le_bytes(bytes))
}

fn le32_at(command: &XidCommand, value: &[u8], at: usize) -> Result<u32, ParseError> {
    value
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| ParseError::InvalidReply(format!("short {} reply", command.name())))
}

/// Enabled digit followed by a little-endian delay (`_ia`)
pub fn single_shot_value(command: &XidCommand, reply: &[u8]) -> Result<SingleShotMode, ParseError> {
    let value = value_bytes(command, reply)?;
    let enabled = match value.first() {
        Some(b'0') => false,
        Some(b'1') => true,
        other => {
            return Err(ParseError::InvalidReply(format!(
                "{} enabled flag {:?} is not '0' or '1'",
                command.name(),
                other
            )))
        }
    };
    Ok(SingleShotMode {
        enabled,
        delay: le32_at(command, value, 1)?,
    })
}

/// Hold-on then hold-off, both little-endian (`_if`)
pub fn signal_filter_value(command: &XidCommand, reply: &[u8]) -> Result<SignalFilter, ParseError> {
    let value = value_bytes(command, reply)?;
    Ok(SignalFilter {
        hold_on: le32_at(command, value, 0)?,
        hold_off: le32_at(command, value, 4)?,
    })
}

/// Little-endian u16 value (`_mk`)
pub fn u16_value(command: &XidCommand, reply: &[u8]) -> Result<u16, ParseError> {
    let value = value_bytes(command, reply)?;
    let bytes: [u8; 2] = value
        .get(..2)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| ParseError::InvalidReply(format!("short {} reply", command.name())))?;
    Ok(u16::from_le_bytes(bytes))
}

/// Eight uppercase hex digits (`_at`)
pub fn hex_value(command: &XidCommand, reply: &[u8]) -> Result<u32, ParseError> {
    let value = value_bytes(command, reply)?;
    let text = std::str::from_utf8(value)
        .map_err(|_| ParseError::InvalidReply(format!("non-ASCII {} reply", command.name())))?;
    u32::from_str_radix(text, 16)
        .map_err(|e| ParseError::InvalidReply(format!("{} reply {:?}: {}", command.name(), text, e)))
}

/// Protocol mode from a `_c1` reply (`_xid0` = XID mode)
pub fn parse_protocol_mode(reply: &[u8]) -> Result<u8, ParseError> {
    digit_value(&XidCommand::GetProtocol, reply, 9)
}

/// Product id byte from `_d2`
///
/// Shipped products answer `'0'..='4'` or `'S'`; anything else is passed
/// through so custom device tables can still match it.
pub fn parse_product_id(reply: &[u8]) -> Result<u8, ParseError> {
    match reply.first() {
        Some(&b) => {
            if !((b'0'..=b'4').contains(&b) || b == b'S') {
                debug!("product id 0x{:02X} is not a shipped XID product", b);
            }
            Ok(b)
        }
        None => Err(ParseError::Incomplete { needed: 1 }),
    }
}

/// Model id byte from `_d3`; shipped models answer `'0'..='i'`
pub fn parse_model_id(reply: &[u8]) -> Result<u8, ParseError> {
    match reply.first() {
        Some(&b) => {
            if !(b'0'..=b'i').contains(&b) {
                debug!("model id 0x{:02X} is not a shipped XID model", b);
            }
            Ok(b)
        }
        None => Err(ParseError::Incomplete { needed: 1 }),
    }
}

/// Major firmware version from `_d4`: `'0'..='2'`
pub fn parse_major_version(reply: &[u8]) -> Result<u8, ParseError> {
    match reply.first() {
        Some(&b) if (b'0'..=b'2').contains(&b) => Ok(b - b'0'),
        Some(&b) => Err(ParseError::InvalidReply(format!(
            "major version 0x{:02X} out of range",
            b
        ))),
        None => Err(ParseError::Incomplete { needed: 1 }),
    }
}

/// Minor firmware version from `_d5`
pub fn parse_minor_version(reply: &[u8]) -> Result<u8, ParseError> {
    match reply.first() {
        Some(&b) if b >= b'0' => Ok(b - b'0'),
        Some(&b) => Err(ParseError::InvalidReply(format!(
            "minor version 0x{:02X} out of range",
            b
        ))),
        None => Err(ParseError::Incomplete { needed: 1 }),
    }
}

/// Free-form text reply (`_d0`, `_d1`); carriage returns become newlines
pub fn parse_text(reply: &[u8]) -> String {
    let end = reply.iter().position(|&b| b == 0).unwrap_or(reply.len());
    String::from_utf8_lossy(&reply[..end])
        .replace('\r', "\n")
        .trim_end()
        .to_string()
}
