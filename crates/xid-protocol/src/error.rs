//! Error types for XID protocol parsing and device catalog lookups

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Leading bytes that cannot start a frame
    #[error("malformed data: skipped byte 0x{skipped:02X}")]
    Malformed { skipped: u8 },

    /// Reply to a query did not have the expected shape
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// Baud rate selector outside 0..=4
    #[error("invalid baud selector: {0}")]
    InvalidSelector(u8),
}

/// Config table lookup failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No entry for the identity triple
    #[error("no device config for product {product}, model {model}, major version {major}")]
    NotFound { product: u8, model: u8, major: u8 },
}

/// Errors loading a device table definition
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The definition could not be read
    #[error("failed to read device table: {0}")]
    Io(#[from] std::io::Error),

    /// The definition is not valid JSON for a device table
    #[cfg(feature = "serde")]
    #[error("failed to parse device table: {0}")]
    Json(#[from] serde_json::Error),

    /// Definition version this library does not understand
    #[error("unsupported device table version {0}")]
    UnsupportedVersion(u32),

    /// Two entries share an identity triple
    #[error("duplicate device config for product {product}, model {model}, major version {major}")]
    Duplicate { product: u8, model: u8, major: u8 },
}
