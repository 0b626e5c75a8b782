//! USB Vendor/Product IDs of serial bridges
//!
//! XID hardware connects through an FTDI USB-serial bridge. Ports on other
//! bridges are still probed (a user may run a pad through a generic
//! adapter), just after the FTDI ones.

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

/// FTDI (Future Technology Devices International)
pub mod ftdi {
    use super::UsbId;

    pub const VID: u16 = 0x0403;

    /// Bridge used by RB-x30/x40, Lumina and SV-1
    pub const FT232R: UsbId = UsbId::new(VID, 0x6001);
    pub const FT2232: UsbId = UsbId::new(VID, 0x6010);
    pub const FT232H: UsbId = UsbId::new(VID, 0x6014);
    /// Bridge used by StimTracker 2 and the pods
    pub const FT231X: UsbId = UsbId::new(VID, 0x6015);

    /// All known FTDI product IDs
    pub const ALL_PIDS: &[u16] = &[0x6001, 0x6010, 0x6014, 0x6015];
}

/// Silicon Labs CP210x
pub mod cp210x {
    pub const VID: u16 = 0x10C4;
    pub const ALL_PIDS: &[u16] = &[0xEA60, 0xEA70, 0xEA71];
}

/// WCH CH340/CH341
pub mod ch340 {
    pub const VID: u16 = 0x1A86;
    pub const ALL_PIDS: &[u16] = &[0x7523, 0x5523];
}

/// Prolific PL2303
pub mod prolific {
    pub const VID: u16 = 0x067B;
    pub const ALL_PIDS: &[u16] = &[0x2303];
}

/// Check if a VID/PID is an FTDI bridge of the kind Cedrus ships
pub fn is_cedrus_bridge(vid: u16, pid: u16) -> bool {
    vid == ftdi::VID && ftdi::ALL_PIDS.contains(&pid)
}

/// Check if a VID/PID is a known serial adapter of any make
pub fn is_known_serial_adapter(vid: u16, pid: u16) -> bool {
    match vid {
        ftdi::VID => ftdi::ALL_PIDS.contains(&pid),
        cp210x::VID => cp210x::ALL_PIDS.contains(&pid),
        ch340::VID => ch340::ALL_PIDS.contains(&pid),
        prolific::VID => prolific::ALL_PIDS.contains(&pid),
        _ => false,
    }
}

/// Get adapter type name from VID
pub fn adapter_name(vid: u16) -> Option<&'static str> {
    match vid {
        ftdi::VID => Some("FTDI"),
        cp210x::VID => Some("CP210x"),
        ch340::VID => Some("CH340"),
        prolific::VID => Some("PL2303"),
        _ => None,
    }
}

/// Port classification, ordered from most to least likely to be XID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum PortClassification {
    /// FTDI bridge of the kind built into XID devices
    CedrusUsb,
    /// Other known USB-serial adapter
    KnownAdapter,
    /// Non-USB or unrecognized port
    Unknown,
}

/// Classify a port by its USB IDs
///
/// Returns the classification and an optional adapter name for display.
pub fn classify_port(vid: Option<u16>, pid: Option<u16>) -> (PortClassification, Option<&'static str>) {
    match (vid, pid) {
        (Some(v), Some(p)) if is_cedrus_bridge(v, p) => {
            (PortClassification::CedrusUsb, adapter_name(v))
        }
        (Some(v), Some(p)) if is_known_serial_adapter(v, p) => {
            (PortClassification::KnownAdapter, adapter_name(v))
        }
        _ => (PortClassification::Unknown, None),
    }
}
