//! XID baud rate selectors
//!
//! Devices are told to switch speed with a small selector (`f1` + selector),
//! never with the raw baud value.

use crate::error::ParseError;

/// Baud rates an XID device can be switched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    /// All rates, in selector order
    pub const ALL: [BaudRate; 5] = [
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];

    /// Order in which detection tries the rates (factory default first)
    pub const SCAN_ORDER: [BaudRate; 5] = [
        BaudRate::B115200,
        BaudRate::B19200,
        BaudRate::B9600,
        BaudRate::B57600,
        BaudRate::B38400,
    ];

    /// Rate m-pods are fixed at
    pub const MPOD: BaudRate = BaudRate::B19200;

    /// Look up a rate by its protocol selector (0..=4)
    pub fn from_selector(selector: u8) -> Result<Self, ParseError> {
        Self::ALL
            .get(selector as usize)
            .copied()
            .ok_or(ParseError::InvalidSelector(selector))
    }

    /// Protocol selector for this rate
    pub fn selector(self) -> u8 {
        match self {
            BaudRate::B9600 => 0,
            BaudRate::B19200 => 1,
            BaudRate::B38400 => 2,
            BaudRate::B57600 => 3,
            BaudRate::B115200 => 4,
        }
    }

    /// Baud value in bits per second
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }

    /// Match a raw baud value to a known rate
    pub fn from_bits_per_second(bps: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.bits_per_second() == bps)
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}
