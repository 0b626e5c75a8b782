//! XID Protocol Library
//!
//! This crate provides the wire protocol for Cedrus XID hardware
//! (RB-series response pads, Lumina, SV-1, StimTracker, m-pod and c-pod):
//!
//! - **Device catalog**: identity triple -> name, ports, key maps, capabilities
//! - **Commands**: two-letter ASCII commands with fixed-width arguments
//! - **Replies**: parsing of echoed query replies
//! - **Response packets**: streaming decoder for key press/release events
//!
//! # Example
//!
//! ```rust
//! use xid_protocol::{ConfigTable, PacketFormat, ProtocolCodec, ResponseCodec};
//!
//! let table = ConfigTable::builtin();
//! let rb840 = table.lookup(b'2', b'3', 2).unwrap();
//!
//! let mut codec = ResponseCodec::new(PacketFormat::for_device(&rb840, 0));
//! codec.push_bytes(&[b'k', 0x30, 0x10, 0x00, 0x00, 0x00]);
//!
//! let response = codec.next_frame().unwrap();
//! assert_eq!(response.key, 1);
//! assert!(response.pressed);
//! assert_eq!(response.reaction_time_ms, 16);
//! ```

pub mod baud;
pub mod command;
pub mod devices;
pub mod error;
pub mod reply;
pub mod response;

pub use baud::BaudRate;
pub use command::{SignalFilter, SingleShotMode, XidCommand};
pub use devices::{Capabilities, ConfigTable, DeviceConfig, DevicePort, KeyMap};
pub use error::{ConfigError, LookupError, ParseError};
pub use response::{encode_response, Decoded, PacketFormat, Response, ResponseCodec};

/// Trait for streaming codecs that parse frames out of a byte stream
pub trait ProtocolCodec {
    /// The frame type produced by this codec
    type Frame;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Run one decode step
    ///
    /// A strict prefix of a valid frame is reported as `Incomplete` and left
    /// in the buffer; a byte that cannot start a frame is dropped and
    /// reported as `Malformed`.
    fn decode(&mut self) -> Decoded<Self::Frame>;

    /// Try to extract the next complete frame, skipping malformed bytes
    fn next_frame(&mut self) -> Option<Self::Frame> {
        loop {
            match self.decode() {
                Decoded::Frame(frame) => return Some(frame),
                Decoded::Malformed { .. } => continue,
                Decoded::Incomplete { .. } => return None,
            }
        }
    }

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
