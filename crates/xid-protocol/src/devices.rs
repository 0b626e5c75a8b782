//! XID device catalog
//!
//! Every device the vendor shipped is identified by the triple
//! (product id, model id, major firmware version), as reported by the
//! `_d2`, `_d3` and `_d4` queries. This module maps that triple to the
//! device's name, its input ports and key maps, and a set of capability
//! flags that the connection layer uses to pick wire variants.

use std::sync::Arc;

use crate::error::{ConfigError, LookupError};

/// Product id of Lumina fMRI pads (`'0'`)
pub const PRODUCT_LUMINA: u8 = b'0';
/// Product id of the SV-1 voice key (`'1'`)
pub const PRODUCT_SV1: u8 = b'1';
/// Product id of RB-series response pads (`'2'`)
pub const PRODUCT_RESPONSE_BOX: u8 = b'2';
/// Product id of m-pods (`'3'`)
pub const PRODUCT_MPOD: u8 = b'3';
/// Product id of c-pods (`'4'`)
pub const PRODUCT_CPOD: u8 = b'4';
/// Product id of StimTracker and StimTrigger units (`'S'`)
pub const PRODUCT_STIMTRACKER: u8 = b'S';

/// Model id of the Lumina LP-400 (`'E'`)
const MODEL_LUMINA_LP400: u8 = b'E';

/// Number of raw key codes a port can report
pub const KEYS_PER_PORT: usize = 8;

/// Key map: raw key code -> logical key (`None` = unmapped)
pub type KeyMap = [Option<u8>; KEYS_PER_PORT];

/// Capability flags derived once from a device's identity
///
/// These replace runtime type inspection: every predicate the connection
/// layer needs is computed when the config is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capabilities {
    pub lumina: bool,
    pub sv1: bool,
    pub response_box: bool,
    pub mpod: bool,
    pub cpod: bool,
    pub stimtracker: bool,
    /// Major firmware version 0 or 1
    pub xid1: bool,
    /// Major firmware version 2
    pub xid2: bool,
    pub stimtracker1: bool,
    pub stimtracker2: bool,
    /// XID1 device with key inputs (not a StimTracker)
    pub xid1_input: bool,
    /// RB-x40 (XID2 response pad with light sensor)
    pub rb_x40: bool,
    pub lumina_lp400: bool,
    /// Commands must be written one byte at a time with a short gap
    pub needs_write_delay: bool,
    /// Device emits key/sensor response packets
    pub reports_responses: bool,
}

impl Capabilities {
    /// Derive the capability set from an identity triple
    pub fn derive(product: u8, model: u8, major: u8) -> Self {
        let lumina = product == PRODUCT_LUMINA;
        let sv1 = product == PRODUCT_SV1;
        let response_box = product == PRODUCT_RESPONSE_BOX;
        let mpod = product == PRODUCT_MPOD;
        let cpod = product == PRODUCT_CPOD;
        let stimtracker = product == PRODUCT_STIMTRACKER;
        let xid1 = major < 2;
        let xid2 = major == 2;
        let stimtracker1 = stimtracker && xid1;
        let stimtracker2 = stimtracker && xid2;

        Self {
            lumina,
            sv1,
            response_box,
            mpod,
            cpod,
            stimtracker,
            xid1,
            xid2,
            stimtracker1,
            stimtracker2,
            xid1_input: xid1 && !stimtracker,
            rb_x40: response_box && xid2,
            lumina_lp400: lumina && model == MODEL_LUMINA_LP400,
            needs_write_delay: (response_box && xid1) || sv1,
            reports_responses: response_box || sv1 || lumina || stimtracker2,
        }
    }

    /// Product family, for display next to the model name
    pub fn family(&self) -> &'static str {
        if self.lumina_lp400 {
            "Lumina LP-400"
        } else if self.lumina {
            "Lumina"
        } else if self.sv1 {
            "SV-1"
        } else if self.response_box {
            "Response pad"
        } else if self.mpod {
            "m-pod"
        } else if self.cpod {
            "c-pod"
        } else if self.stimtracker {
            "StimTracker"
        } else {
            "XID device"
        }
    }

    /// Whether digital output uses the one-byte `ah` command instead of `mh`
    pub fn uses_byte_lines_command(&self) -> bool {
        ((self.response_box || self.lumina) && self.xid2) || self.sv1
    }
}

/// Static port description used by the embedded table
#[derive(Debug, Clone, Copy)]
struct DevicePortStatic {
    name: &'static str,
    number: u8,
    lines: u8,
    key_map: &'static [i8; KEYS_PER_PORT],
}

/// A logical group of input lines on a device
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DevicePort {
    /// Port name (e.g. "Key", "Light Sensor")
    pub name: String,
    /// Port number as reported in response packets
    pub number: u8,
    /// Number of lines on the port
    pub lines: u8,
    /// Whether this port produces responses
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub is_response_port: bool,
    /// Raw key code -> logical key
    #[cfg_attr(feature = "serde", serde(default))]
    pub key_map: KeyMap,
}

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

impl DevicePort {
    /// Create a response port with an identity key map
    pub fn new(name: impl Into<String>, number: u8, lines: u8) -> Self {
        let mut key_map = [None; KEYS_PER_PORT];
        for (raw, slot) in key_map.iter_mut().enumerate().take(lines as usize) {
            *slot = Some(raw as u8);
        }
        Self {
            name: name.into(),
            number,
            lines,
            is_response_port: true,
            key_map,
        }
    }

    /// Replace the key map
    pub fn with_key_map(mut self, key_map: KeyMap) -> Self {
        self.key_map = key_map;
        self
    }

    /// Logical key for a raw key code
    pub fn mapped_key(&self, raw_key: u8) -> Option<u8> {
        self.key_map.get(raw_key as usize).copied().flatten()
    }
}

impl From<&DevicePortStatic> for DevicePort {
    fn from(s: &DevicePortStatic) -> Self {
        let mut key_map = [None; KEYS_PER_PORT];
        for (slot, &raw) in key_map.iter_mut().zip(s.key_map.iter()) {
            *slot = u8::try_from(raw).ok();
        }
        Self {
            name: s.name.to_string(),
            number: s.number,
            lines: s.lines,
            is_response_port: true,
            key_map,
        }
    }
}

/// Immutable description of one XID device model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    name: String,
    product_id: u8,
    model_id: u8,
    major_version: u8,
    output_lines: u8,
    ports: Vec<DevicePort>,
    capabilities: Capabilities,
}

impl DeviceConfig {
    /// Create a config; capabilities are derived from the identity triple
    pub fn new(
        name: impl Into<String>,
        product_id: u8,
        model_id: u8,
        major_version: u8,
        output_lines: u8,
        ports: Vec<DevicePort>,
    ) -> Self {
        Self {
            name: name.into(),
            product_id,
            model_id,
            major_version,
            output_lines,
            ports,
            capabilities: Capabilities::derive(product_id, model_id, major_version),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn product_id(&self) -> u8 {
        self.product_id
    }

    pub fn model_id(&self) -> u8 {
        self.model_id
    }

    pub fn major_version(&self) -> u8 {
        self.major_version
    }

    /// Identity triple (product, model, major)
    pub fn identity(&self) -> (u8, u8, u8) {
        (self.product_id, self.model_id, self.major_version)
    }

    /// Number of digital output lines
    pub fn output_lines(&self) -> u8 {
        self.output_lines
    }

    /// Bitmask covering every output line
    pub fn output_lines_mask(&self) -> u32 {
        if self.output_lines >= 32 {
            u32::MAX
        } else {
            (1u32 << self.output_lines) - 1
        }
    }

    pub fn ports(&self) -> &[DevicePort] {
        &self.ports
    }

    /// Port by its port number (not its position)
    pub fn port(&self, number: u8) -> Option<&DevicePort> {
        self.ports.iter().find(|p| p.number == number)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Logical key for a raw key on a port
    pub fn mapped_key(&self, port: u8, raw_key: u8) -> Option<u8> {
        self.port(port).and_then(|p| p.mapped_key(raw_key))
    }

    /// Exact identity match
    pub fn matches(&self, product: u8, model: u8, major: u8) -> bool {
        self.product_id == product && self.model_id == model && self.major_version == major
    }
}

impl std::fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (product '{}', model '{}', XID{})",
            self.name,
            self.product_id as char,
            self.model_id as char,
            self.major_version.max(1)
        )
    }
}

/// Static device description
#[derive(Debug, Clone, Copy)]
struct DeviceConfigStatic {
    name: &'static str,
    product_id: u8,
    model_id: u8,
    major_version: u8,
    output_lines: u8,
    ports: &'static [DevicePortStatic],
}

impl From<&DeviceConfigStatic> for DeviceConfig {
    fn from(s: &DeviceConfigStatic) -> Self {
        DeviceConfig::new(
            s.name,
            s.product_id,
            s.model_id,
            s.major_version,
            s.output_lines,
            s.ports.iter().map(DevicePort::from).collect(),
        )
    }
}

const RB_X30_5_KEYS: [i8; 8] = [-1, 0, -1, 1, 2, 3, 4, -1];
const RB_X30_7_KEYS: [i8; 8] = [-1, 0, 1, 2, 3, 4, 5, 6];
const RB_830_KEYS: [i8; 8] = [7, 3, 4, 1, 2, 5, 6, 0];
const RB_834_KEYS: [i8; 8] = [7, 0, 1, 2, 3, 4, 5, 6];
const LUMINA_KEYS: [i8; 8] = [-1, 0, 1, 2, 3, 4, -1, -1];
const SINGLE_LINE_KEYS: [i8; 8] = [0, -1, -1, -1, -1, -1, -1, -1];
const LIGHT_SENSOR_KEYS: [i8; 8] = [0, 1, -1, -1, -1, -1, -1, -1];

const fn key_port(lines: u8, key_map: &'static [i8; 8]) -> DevicePortStatic {
    DevicePortStatic {
        name: "Key",
        number: 0,
        lines,
        key_map,
    }
}

const LIGHT_SENSOR: DevicePortStatic = DevicePortStatic {
    name: "Light Sensor",
    number: 2,
    lines: 1,
    key_map: &SINGLE_LINE_KEYS,
};

/// Response pads, Lumina, SV-1 and StimTracker units
static DEVICES: &[DeviceConfigStatic] = &[
    DeviceConfigStatic {
        name: "RB-530",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'1',
        major_version: 1,
        output_lines: 8,
        ports: &[key_port(5, &RB_X30_5_KEYS)],
    },
    DeviceConfigStatic {
        name: "RB-540",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'1',
        major_version: 2,
        output_lines: 8,
        ports: &[key_port(5, &RB_X30_5_KEYS), LIGHT_SENSOR],
    },
    DeviceConfigStatic {
        name: "RB-730",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'2',
        major_version: 1,
        output_lines: 8,
        ports: &[key_port(7, &RB_X30_7_KEYS)],
    },
    DeviceConfigStatic {
        name: "RB-740",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'2',
        major_version: 2,
        output_lines: 8,
        ports: &[key_port(7, &RB_X30_7_KEYS), LIGHT_SENSOR],
    },
    DeviceConfigStatic {
        name: "RB-830",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'3',
        major_version: 1,
        output_lines: 8,
        ports: &[key_port(8, &RB_830_KEYS)],
    },
    DeviceConfigStatic {
        name: "RB-840",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'3',
        major_version: 2,
        output_lines: 8,
        ports: &[key_port(8, &RB_830_KEYS), LIGHT_SENSOR],
    },
    DeviceConfigStatic {
        name: "RB-834",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'4',
        major_version: 1,
        output_lines: 8,
        ports: &[key_port(8, &RB_834_KEYS)],
    },
    DeviceConfigStatic {
        name: "RB-844",
        product_id: PRODUCT_RESPONSE_BOX,
        model_id: b'4',
        major_version: 2,
        output_lines: 8,
        ports: &[key_port(8, &RB_834_KEYS), LIGHT_SENSOR],
    },
    DeviceConfigStatic {
        name: "Lumina LP-400",
        product_id: PRODUCT_LUMINA,
        model_id: MODEL_LUMINA_LP400,
        major_version: 1,
        output_lines: 8,
        ports: &[DevicePortStatic {
            name: "Key + Scanner Trigger",
            number: 0,
            lines: 5,
            key_map: &LUMINA_KEYS,
        }],
    },
    DeviceConfigStatic {
        name: "Lumina 3G",
        product_id: PRODUCT_LUMINA,
        model_id: b'A',
        major_version: 2,
        output_lines: 8,
        ports: &[
            DevicePortStatic {
                name: "Lumina Pad 1",
                number: 0,
                lines: 5,
                key_map: &LUMINA_KEYS,
            },
            DevicePortStatic {
                name: "Lumina Pad 2",
                number: 1,
                lines: 5,
                key_map: &LUMINA_KEYS,
            },
            DevicePortStatic {
                name: "Light Sensor + Scanner Trigger",
                number: 2,
                lines: 2,
                key_map: &LIGHT_SENSOR_KEYS,
            },
        ],
    },
    DeviceConfigStatic {
        name: "SV-1 Voice Key",
        product_id: PRODUCT_SV1,
        model_id: b'B',
        major_version: 1,
        output_lines: 8,
        ports: &[DevicePortStatic {
            name: "Voice Key",
            number: 2,
            lines: 1,
            key_map: &SINGLE_LINE_KEYS,
        }],
    },
    DeviceConfigStatic {
        name: "StimTracker ST-100",
        product_id: PRODUCT_STIMTRACKER,
        model_id: b'C',
        major_version: 0,
        output_lines: 8,
        ports: &[],
    },
    DeviceConfigStatic {
        name: "StimTracker Duo",
        product_id: PRODUCT_STIMTRACKER,
        model_id: b'1',
        major_version: 2,
        output_lines: 16,
        ports: &[],
    },
    DeviceConfigStatic {
        name: "StimTracker Quad",
        product_id: PRODUCT_STIMTRACKER,
        model_id: b'2',
        major_version: 2,
        output_lines: 16,
        ports: &[],
    },
    DeviceConfigStatic {
        name: "StimTracker Quad with m-pod 4",
        product_id: PRODUCT_STIMTRACKER,
        model_id: b'3',
        major_version: 2,
        output_lines: 16,
        ports: &[],
    },
    DeviceConfigStatic {
        name: "StimTrigger",
        product_id: PRODUCT_STIMTRACKER,
        model_id: b'4',
        major_version: 2,
        output_lines: 16,
        ports: &[],
    },
];

/// m-pod / c-pod models: (model code, target system, output lines)
static POD_MODELS: &[(u8, &str, u8)] = &[
    (b'a', "ABM", 8),
    (b'A', "ADI", 8),
    (b'C', "ANT Neuro", 8),
    (b'D', "Biopac MP35/36", 8),
    (b'E', "Biopac MP150", 8),
    (b'F', "Biosemi", 16),
    (b'M', "actiCHamp", 8),
    (b'B', "Brain Products DB-26", 16),
    (b'n', "Bittium NeurOne", 8),
    (b'X', "CGX", 16),
    (b'O', "EGI", 8),
    (b'i', "iWorx", 8),
    (b'G', "MindWare", 8),
    (b'R', "NeuraLynx", 16),
    (b'H', "Neuroscan 16-bit", 16),
    (b'h', "Neuroscan Grael", 16),
    (b'N', "NIRx", 8),
    (b'P', "Parallel port", 13),
    (b'J', "SMI", 8),
    (b's', "SR Research", 8),
    (b't', "TMSi", 8),
    (b'T', "Tobii", 8),
    (b'0', "no model set", 16),
    (b'g', "Generic", 8),
];

/// Catalog of known devices, keyed by identity triple
#[derive(Debug, Clone)]
pub struct ConfigTable {
    configs: Vec<Arc<DeviceConfig>>,
}

impl ConfigTable {
    /// The embedded catalog of every shipped device
    pub fn builtin() -> Self {
        let mut configs: Vec<Arc<DeviceConfig>> =
            DEVICES.iter().map(|d| Arc::new(d.into())).collect();

        for (prefix, product) in [("m-pod", PRODUCT_MPOD), ("c-pod", PRODUCT_CPOD)] {
            for &(model, target, lines) in POD_MODELS {
                configs.push(Arc::new(DeviceConfig::new(
                    format!("{} ({})", prefix, target),
                    product,
                    model,
                    2,
                    lines,
                    Vec::new(),
                )));
            }
        }

        Self { configs }
    }

    /// Build a table from explicit configs, rejecting duplicate identities
    pub fn from_configs(configs: Vec<DeviceConfig>) -> Result<Self, ConfigError> {
        let mut table = Self {
            configs: Vec::with_capacity(configs.len()),
        };
        for config in configs {
            let (product, model, major) = config.identity();
            if table.lookup(product, model, major).is_ok() {
                return Err(ConfigError::Duplicate {
                    product,
                    model,
                    major,
                });
            }
            table.configs.push(Arc::new(config));
        }
        Ok(table)
    }

    /// Exact lookup on (product, model, major)
    pub fn lookup(
        &self,
        product: u8,
        model: u8,
        major: u8,
    ) -> Result<Arc<DeviceConfig>, LookupError> {
        self.configs
            .iter()
            .find(|c| c.matches(product, model, major))
            .cloned()
            .ok_or(LookupError::NotFound {
                product,
                model,
                major,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceConfig>> {
        self.configs.iter()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl Default for ConfigTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(feature = "serde")]
mod definition {
    use std::path::Path;

    use serde::{Deserialize, Serialize};

    use super::{ConfigTable, DeviceConfig, DevicePort};
    use crate::error::ConfigError;

    /// Current version of the JSON table format
    pub const TABLE_VERSION: u32 = 1;

    #[derive(Debug, Serialize, Deserialize)]
    struct TableDefinition {
        version: u32,
        devices: Vec<DeviceDefinition>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct DeviceDefinition {
        name: String,
        product_id: u8,
        model_id: u8,
        major_version: u8,
        #[serde(default = "default_output_lines")]
        output_lines: u8,
        #[serde(default)]
        ports: Vec<DevicePort>,
    }

    fn default_output_lines() -> u8 {
        8
    }

    impl ConfigTable {
        /// Parse a versioned JSON table definition
        pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
            let def: TableDefinition = serde_json::from_str(json)?;
            if def.version != TABLE_VERSION {
                return Err(ConfigError::UnsupportedVersion(def.version));
            }
            let configs = def
                .devices
                .into_iter()
                .map(|d| {
                    DeviceConfig::new(
                        d.name,
                        d.product_id,
                        d.model_id,
                        d.major_version,
                        d.output_lines,
                        d.ports,
                    )
                })
                .collect();
            Self::from_configs(configs)
        }

        /// Load a JSON table definition from disk
        pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let json = std::fs::read_to_string(path)?;
            Self::from_json_str(&json)
        }

        /// Serialize the table to its JSON definition
        pub fn to_json_string(&self) -> Result<String, ConfigError> {
            let def = TableDefinition {
                version: TABLE_VERSION,
                devices: self
                    .iter()
                    .map(|c| DeviceDefinition {
                        name: c.name().to_string(),
                        product_id: c.product_id(),
                        model_id: c.model_id(),
                        major_version: c.major_version(),
                        output_lines: c.output_lines(),
                        ports: c.ports().to_vec(),
                    })
                    .collect(),
            };
            Ok(serde_json::to_string_pretty(&def)?)
        }
    }
}

#[cfg(feature = "serde")]
pub use definition::TABLE_VERSION;
