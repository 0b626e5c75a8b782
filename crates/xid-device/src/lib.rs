//! XID Device Connections
//!
//! This crate owns live connections to Cedrus XID devices: response pads,
//! StimTrackers, Lumina scanners and the rest of the family.
//!
//! # Architecture
//!
//! - [`DeviceConnection`] wraps one transport and exposes every device
//!   operation, guarded by the capabilities of the identified model
//! - [`DeviceScanner`] enumerates ports, identifies what answers and keeps
//!   the resulting connections behind [`DeviceHandle`]s
//! - Input events are decoded into a per-connection queue that also tracks
//!   which keys are held down
//!
//! A connection that fails a read or write is marked lost and refuses
//! further I/O until it is reopened.
//!
//! # Example
//!
//! ```rust,no_run
//! use xid_detect::SystemPorts;
//! use xid_device::DeviceScanner;
//!
//! let mut scanner = DeviceScanner::new(SystemPorts::new());
//! for handle in scanner.detect().unwrap() {
//!     let device = scanner.get_mut(handle).unwrap();
//!     device.open().unwrap();
//!     device.poll_for_response().unwrap();
//!     while let Some(response) = device.get_next_response() {
//!         println!("{}: {:?}", handle, response);
//!     }
//! }
//! ```

pub mod connection;
pub mod error;
pub mod pulse;
pub mod registry;
pub mod responses;
pub mod state;

pub use connection::{ConnectionConfig, DeviceConnection};
pub use error::DeviceError;
pub use pulse::{PulseTable, PulseTableEntry};
pub use registry::DeviceScanner;
pub use responses::{KeyResponse, ResponseQueue};
pub use state::{ConnectionState, DeviceHandle, VolatileSettings};
