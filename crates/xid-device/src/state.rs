//! Connection state tracking

use serde::{Deserialize, Serialize};

/// Unique identifier for a device in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u32);

impl DeviceHandle {
    /// Get the raw handle value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Port closed
    Disconnected,
    /// Port open, identity not yet established
    Identifying,
    /// Ready for commands
    Connected,
}

/// Settings written to the device since it was opened
///
/// The firmware keeps these in RAM until they are saved to flash; this is
/// the host's record of what it last wrote. `None` means never set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatileSettings {
    pub pulse_duration_ms: Option<u32>,
    pub trigger_debounce_ms: Option<u8>,
    pub button_debounce_ms: Option<u8>,
    pub ac_debounce_ms: Option<u8>,
    pub light_sensor_mode: Option<u8>,
    pub light_sensor_threshold: Option<u8>,
    pub accessory_connector_mode: Option<u8>,
    pub output_logic: Option<u8>,
    pub trigger_default: Option<bool>,
    pub mixed_input_mode: Option<u8>,
    pub number_of_lines: Option<u8>,
    pub pulse_table_bitmask: Option<u16>,
    pub voice_key_drop_delay: Option<u8>,
}

impl VolatileSettings {
    /// Forget everything, as after a factory reset
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
