//! XID Device Simulation Library
//!
//! This crate provides virtual XID devices for testing the detection and
//! connection layers without physical hardware. It includes:
//!
//! - **VirtualXidDevice**: firmware model that answers queries, keeps
//!   register state and emits key press packets
//! - **SimTransport**: a [`Transport`](xid_detect::Transport) wired to a
//!   virtual device
//! - **SimPorts**: a [`PortProvider`](xid_detect::PortProvider) with one
//!   virtual device per port
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use xid_detect::{PortProvider, Transport};
//! use xid_protocol::BaudRate;
//! use xid_sim::{SimPorts, VirtualXidDevice};
//!
//! let mut ports = SimPorts::new();
//! let pad = ports.add("SIM0", VirtualXidDevice::new("RB-840", b'2', b'3', 2));
//!
//! let mut transport = ports.connect("SIM0", BaudRate::B115200).unwrap();
//! transport.write(b"_c1").unwrap();
//! assert_eq!(transport.read(64, Duration::ZERO).unwrap(), b"_xid0");
//!
//! pad.lock().unwrap().press_key(0, 3);
//! assert_eq!(transport.read(64, Duration::ZERO).unwrap().len(), 6);
//! ```

pub mod device;
pub mod transport;

pub use device::{VirtualDeviceConfig, VirtualXidDevice};
pub use transport::{SharedDevice, SimPorts, SimTransport};
