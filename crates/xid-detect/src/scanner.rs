//! Serial port scanner
//!
//! This module provides serial port enumeration. Cedrus hardware sits
//! behind FTDI bridges, so ports are annotated with a classification, but
//! every port that is not skipped is still offered for probing.

use serialport::{available_ports, SerialPortType};
use tracing::info;

use crate::error::DetectError;
use crate::usb_ids::{classify_port, PortClassification};

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
    /// How likely the port is to carry an XID device
    pub classification: PortClassification,
}

impl SerialPortInfo {
    /// A port known only by name (virtual and non-USB ports)
    pub fn named(port: impl Into<String>) -> Self {
        let port = port.into();
        let (classification, _) = classify_port(None, None);
        Self {
            port,
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
            classification,
        }
    }

    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => {
                let (classification, _) = classify_port(Some(usb.vid), Some(usb.pid));
                Self {
                    port: name,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    serial_number: usb.serial_number.clone(),
                    manufacturer: usb.manufacturer.clone(),
                    product: usb.product.clone(),
                    classification,
                }
            }
            _ => Self::named(name),
        }
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Skip ports matching these patterns
    pub skip_patterns: Vec<String>,
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: vec![
                    // Bluetooth ports on macOS
                    "Bluetooth".to_string(),
                    // Debug/logging ports
                    "debug".to_string(),
                ],
            },
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate all available serial ports, most promising first
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        info!("Enumerating serial ports...");
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let mut result: Vec<_> = ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(p))
            .collect();
        result.sort_by_key(|p| p.classification);

        if result.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", result.len());
            for port in &result {
                let desc = port.product.as_deref().unwrap_or("Unknown");
                info!("  {} - {} ({:?})", port.port, desc, port.classification);
            }
        }

        Ok(result)
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &SerialPortInfo) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern.as_str()))
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}
