//! XID Serial Port Detection Library
//!
//! This crate provides the byte transport for Cedrus XID devices, serial
//! port enumeration, and identification of the device on a port.
//!
//! # Example
//!
//! ```rust,no_run
//! use xid_detect::{SystemPorts, PortProvider, XidProber};
//!
//! let ports = SystemPorts::new();
//! let prober = XidProber::new();
//!
//! for port in ports.enumerate().unwrap() {
//!     if let Ok(found) = prober.probe_port(&ports, &port.port) {
//!         println!("{}: {:?}", port.port, found.identification.identity());
//!     }
//! }
//! ```

pub mod error;
pub mod probe;
pub mod scanner;
pub mod transport;
pub mod usb_ids;

pub use error::{DetectError, TransportError};
pub use probe::{Identification, ProbeConfig, ProbeResult, XidProber};
pub use scanner::{PortScanner, ScannerConfig, SerialPortInfo};
pub use transport::{
    exchange, exchange_until_quiet, PortProvider, QueryOptions, SerialTransport, SystemPorts,
    Transport,
};
pub use usb_ids::PortClassification;
