//! Error types for device connections

use thiserror::Error;
use xid_detect::{DetectError, TransportError};
use xid_protocol::{LookupError, ParseError};

/// Errors that can occur while talking to a device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A read or write failed; the connection stays unusable until reopened
    #[error("lost connection to {0}")]
    ConnectionLost(String),

    /// The connection is closed
    #[error("{0} is not connected")]
    NotConnected(String),

    /// A setter was given a value the register does not accept
    #[error("invalid {register} value {value} (allowed {allowed})")]
    InvalidArgument {
        register: &'static str,
        value: u32,
        allowed: String,
    },

    /// The identity triple is not in the config table
    #[error("unknown device: product {product}, model {model}, major version {major}")]
    UnknownDevice { product: u8, model: u8, major: u8 },

    /// The register does not exist on this device family
    #[error("{register} is not supported by {device}")]
    Unsupported {
        register: &'static str,
        device: String,
    },

    /// The device answered a query with something unexpected
    #[error("invalid {command} reply: {reply}")]
    InvalidReply { command: &'static str, reply: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<LookupError> for DeviceError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::NotFound {
                product,
                model,
                major,
            } => DeviceError::UnknownDevice {
                product,
                model,
                major,
            },
        }
    }
}
