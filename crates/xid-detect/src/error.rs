//! Error types for XID transport and detection

use thiserror::Error;
use xid_protocol::ParseError;

/// Errors raised by a byte transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Failed to open the port
    #[error("failed to open port {port}: {reason}")]
    Connect { port: String, reason: String },

    /// Write failed or timed out
    #[error("write to {port} failed: {reason}")]
    Write { port: String, reason: String },

    /// Read failed for a reason other than a timeout
    #[error("read from {port} failed: {reason}")]
    Read { port: String, reason: String },

    /// Port is closed
    #[error("port {0} is not open")]
    NotOpen(String),
}

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// Nothing answered the protocol query
    #[error("no reply from {port} at {baud} baud")]
    NoReply { port: String, baud: u32 },

    /// Something answered, but not as an XID device
    #[error("{port} is not an XID device (replied {reply:?})")]
    NotXid { port: String, reply: String },

    /// An XID device gave an unusable identification reply
    #[error("invalid identification reply: {0}")]
    Parse(#[from] ParseError),

    /// The caller cancelled the scan
    #[error("scan cancelled")]
    Cancelled,

    /// Transport failure during the probe
    #[error(transparent)]
    Transport(#[from] TransportError),
}
