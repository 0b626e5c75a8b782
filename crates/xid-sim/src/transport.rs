//! In-memory transport and port provider for virtual devices

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;
use xid_detect::{DetectError, PortProvider, SerialPortInfo, Transport, TransportError};
use xid_protocol::BaudRate;

use crate::device::VirtualXidDevice;

/// A virtual device shared between the test and its transports
pub type SharedDevice = Arc<Mutex<VirtualXidDevice>>;

fn lock(device: &SharedDevice) -> MutexGuard<'_, VirtualXidDevice> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport wired to a virtual device
///
/// Bytes only flow while the transport's baud rate matches the rate the
/// device listens at, as on a real serial line.
pub struct SimTransport {
    device: SharedDevice,
    port_name: String,
    baud: BaudRate,
    open: bool,
}

impl SimTransport {
    /// Create a closed transport
    pub fn new(device: SharedDevice, port_name: impl Into<String>, baud: BaudRate) -> Self {
        Self {
            device,
            port_name: port_name.into(),
            baud,
            open: false,
        }
    }

    /// Create and open a transport
    pub fn connect(
        device: SharedDevice,
        port_name: impl Into<String>,
        baud: BaudRate,
    ) -> Result<Self, TransportError> {
        let mut transport = Self::new(device, port_name, baud);
        transport.open()?;
        Ok(transport)
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotOpen(self.port_name.clone()))
        }
    }
}

impl Transport for SimTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.close();
        let mut device = lock(&self.device);
        if device.unplugged() {
            return Err(TransportError::Connect {
                port: self.port_name.clone(),
                reason: "device unplugged".to_string(),
            });
        }
        device.clear_output();
        drop(device);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn read(&mut self, max_bytes: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let mut device = lock(&self.device);
        if device.fail_reads() {
            return Err(TransportError::Read {
                port: self.port_name.clone(),
                reason: "device disconnected".to_string(),
            });
        }
        if device.baud() != self.baud {
            return Ok(Vec::new());
        }
        Ok(device.transmit(max_bytes))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut device = lock(&self.device);
        if device.fail_writes() {
            return Err(TransportError::Write {
                port: self.port_name.clone(),
                reason: "device disconnected".to_string(),
            });
        }
        if device.baud() == self.baud {
            device.receive(bytes);
        }
        Ok(())
    }

    fn write_paced(&mut self, bytes: &[u8], _gap: Duration) -> Result<(), TransportError> {
        // Same byte-per-write shape as a real paced write, without sleeping
        for byte in bytes {
            self.write(std::slice::from_ref(byte))?;
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.ensure_open()?;
        lock(&self.device).clear_output();
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: BaudRate) {
        self.baud = baud;
    }

    fn baud_rate(&self) -> BaudRate {
        self.baud
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// A set of virtual ports, each with a device attached
#[derive(Default, Clone)]
pub struct SimPorts {
    ports: Vec<(String, SharedDevice)>,
    fail_enumeration: bool,
}

impl SimPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device to a new port and return the shared handle to it
    pub fn add(&mut self, port: impl Into<String>, device: VirtualXidDevice) -> SharedDevice {
        let shared = Arc::new(Mutex::new(device));
        self.ports.push((port.into(), Arc::clone(&shared)));
        shared
    }

    /// Detach a port
    pub fn remove(&mut self, port: &str) {
        self.ports.retain(|(name, _)| name != port);
    }

    /// Make enumeration fail
    pub fn set_fail_enumeration(&mut self, fail: bool) {
        self.fail_enumeration = fail;
    }

    pub fn device(&self, port: &str) -> Option<SharedDevice> {
        self.ports
            .iter()
            .find(|(name, _)| name == port)
            .map(|(_, device)| Arc::clone(device))
    }
}

impl PortProvider for SimPorts {
    fn enumerate(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        if self.fail_enumeration {
            return Err(DetectError::EnumerationFailed(
                "simulated enumeration failure".to_string(),
            ));
        }
        debug!("Enumerating {} virtual port(s)", self.ports.len());
        Ok(self
            .ports
            .iter()
            .map(|(name, _)| SerialPortInfo::named(name.clone()))
            .collect())
    }

    fn connect(&self, port: &str, baud: BaudRate) -> Result<Box<dyn Transport>, TransportError> {
        let device = self.device(port).ok_or_else(|| TransportError::Connect {
            port: port.to_string(),
            reason: "no such port".to_string(),
        })?;
        Ok(Box::new(SimTransport::connect(device, port, baud)?))
    }
}
