//! Response packet decoding
//!
//! Input devices report key presses and sensor events as fixed-size
//! packets, unsolicited, interleaved with nothing else once the device is
//! idle.
//!
//! # Packet Formats
//! ```text
//! XID (6 bytes):            'k' [info] [rt0 rt1 rt2 rt3]
//! StimTracker 2 (9 bytes):  'o' [port] [key] ['0'|'1'] [rt0 rt1 rt2 rt3] 00
//! ```
//!
//! The XID info byte packs port (bits 0-3, bit 3 set = invalid), the press
//! flag (bit 4) and the key (bits 5-7). Reaction times are little-endian
//! milliseconds since the last RT timer reset.
//!
//! Lumina 3G units running firmware 2.1 append a stray seventh byte to
//! every XID packet; that variant is decoded with the extra byte dropped.

use tracing::{debug, trace};

use crate::devices::DeviceConfig;
use crate::ProtocolCodec;

/// Lead byte of an XID response packet
pub const XID_LEAD: u8 = b'k';
/// Lead byte of a StimTracker 2 response packet
pub const ST2_LEAD: u8 = b'o';

const INVALID_PORT_BIT: u8 = 0x08;
const PRESSED_BIT: u8 = 0x10;

/// Maximum buffered bytes before old data is dropped
const MAX_BUFFER_LEN: usize = 256;

/// One decoded button or sensor event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Response {
    /// Device port the event came from
    pub port: u8,
    /// Key code as the device reported it, before any key map
    pub key: u8,
    /// Press (true) or release (false)
    pub pressed: bool,
    /// Milliseconds since the last RT timer reset
    pub reaction_time_ms: u32,
}

/// Wire layout of response packets for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFormat {
    /// 6-byte `'k'` packets (XID1 and XID2 input devices)
    Xid,
    /// 6-byte `'k'` packets followed by one stray byte (Lumina 3G fw 2.1)
    XidSevenByte,
    /// 9-byte `'o'` packets (StimTracker 2)
    StimTracker2,
}

impl PacketFormat {
    /// Pick the packet format for a device and its minor firmware version
    pub fn for_device(config: &DeviceConfig, minor_version: u8) -> Self {
        let caps = config.capabilities();
        if caps.stimtracker2 {
            PacketFormat::StimTracker2
        } else if caps.lumina && config.major_version() == 2 && minor_version == 1 {
            PacketFormat::XidSevenByte
        } else {
            PacketFormat::Xid
        }
    }

    /// Total frame length in bytes
    pub fn frame_len(self) -> usize {
        match self {
            PacketFormat::Xid => 6,
            PacketFormat::XidSevenByte => 7,
            PacketFormat::StimTracker2 => 9,
        }
    }

    /// Byte every frame starts with
    pub fn lead_byte(self) -> u8 {
        match self {
            PacketFormat::Xid | PacketFormat::XidSevenByte => XID_LEAD,
            PacketFormat::StimTracker2 => ST2_LEAD,
        }
    }
}

/// Result of one decode step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<F> {
    /// A complete frame was consumed
    Frame(F),
    /// The buffer holds a valid frame prefix (or nothing); more bytes needed
    Incomplete { needed: usize },
    /// One byte that cannot start a frame was skipped
    Malformed { skipped: u8 },
}

/// Encode a response as its wire packet
pub fn encode_response(format: PacketFormat, response: &Response) -> Vec<u8> {
    let rt = response.reaction_time_ms.to_le_bytes();
    match format {
        PacketFormat::Xid | PacketFormat::XidSevenByte => {
            let mut info = response.port & 0x07;
            if response.pressed {
                info |= PRESSED_BIT;
            }
            info |= (response.key & 0x07) << 5;
            let mut out = vec![XID_LEAD, info];
            out.extend_from_slice(&rt);
            if format == PacketFormat::XidSevenByte {
                out.push(0);
            }
            out
        }
        PacketFormat::StimTracker2 => {
            let mut out = vec![
                ST2_LEAD,
                response.port,
                response.key,
                if response.pressed { b'1' } else { b'0' },
            ];
            out.extend_from_slice(&rt);
            out.push(0);
            out
        }
    }
}

/// Streaming response packet decoder
#[derive(Debug, Clone)]
pub struct ResponseCodec {
    format: PacketFormat,
    buffer: Vec<u8>,
}

impl ResponseCodec {
    /// Create a codec for a packet format
    pub fn new(format: PacketFormat) -> Self {
        Self {
            format,
            buffer: Vec::with_capacity(format.frame_len() * 4),
        }
    }

    pub fn format(&self) -> PacketFormat {
        self.format
    }

    /// Bytes buffered but not yet decoded
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn skip_lead(&mut self) -> Decoded<Response> {
        let skipped = self.buffer.remove(0);
        debug!("Skipping byte 0x{:02X} while resynchronizing", skipped);
        Decoded::Malformed { skipped }
    }

    fn parse_frame(format: PacketFormat, frame: &[u8]) -> Response {
        match format {
            PacketFormat::Xid | PacketFormat::XidSevenByte => {
                let info = frame[1];
                Response {
                    port: info & 0x0F,
                    key: (info & 0xE0) >> 5,
                    pressed: info & PRESSED_BIT != 0,
                    reaction_time_ms: u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]),
                }
            }
            PacketFormat::StimTracker2 => Response {
                port: frame[1],
                key: frame[2],
                pressed: frame[3] == b'1',
                reaction_time_ms: u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]),
            },
        }
    }
}

impl ProtocolCodec for ResponseCodec {
    type Frame = Response;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent unbounded growth if nothing ever decodes
        if self.buffer.len() > MAX_BUFFER_LEN {
            let start = self.buffer.len() - self.format.frame_len();
            self.buffer.drain(..start);
        }
    }

    fn decode(&mut self) -> Decoded<Response> {
        let frame_len = self.format.frame_len();

        let Some(&lead) = self.buffer.first() else {
            return Decoded::Incomplete { needed: frame_len };
        };
        if lead != self.format.lead_byte() {
            return self.skip_lead();
        }

        if matches!(self.format, PacketFormat::Xid | PacketFormat::XidSevenByte) {
            if let Some(&info) = self.buffer.get(1) {
                if info & INVALID_PORT_BIT != 0 {
                    return self.skip_lead();
                }
            }
        }

        if self.buffer.len() < frame_len {
            return Decoded::Incomplete {
                needed: frame_len - self.buffer.len(),
            };
        }

        if self.format == PacketFormat::StimTracker2 && self.buffer[frame_len - 1] != 0 {
            return self.skip_lead();
        }

        let frame: Vec<u8> = self.buffer.drain(..frame_len).collect();
        trace!("Response packet: {:02X?}", frame);
        Decoded::Frame(Self::parse_frame(self.format, &frame))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
