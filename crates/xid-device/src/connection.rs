//! Connection to one XID device
//!
//! A [`DeviceConnection`] owns the transport of an identified device and
//! exposes its registers, response polling, digital output lines and pulse
//! table. All I/O is caller-driven: nothing here spawns threads or waits
//! longer than one bounded query.
//!
//! Register access is filtered by device family before anything is sent.
//! A setter for a register the family lacks fails with
//! [`DeviceError::Unsupported`], and out-of-range values fail with
//! [`DeviceError::InvalidArgument`].

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use xid_detect::transport::{PACED_WRITE_GAP, READ_CHUNK};
use xid_detect::{
    exchange, exchange_until_quiet, ProbeConfig, ProbeResult, QueryOptions, Transport,
    TransportError, XidProber,
};
use xid_protocol::{
    reply, BaudRate, Capabilities, ConfigTable, Decoded, DeviceConfig, EncodeCommand,
    PacketFormat, ParseError, ProtocolCodec, ResponseCodec, SignalFilter, SingleShotMode,
    XidCommand,
};

use crate::error::DeviceError;
use crate::pulse::{PulseTable, PulseTableEntry};
use crate::responses::{KeyResponse, ResponseQueue};
use crate::state::{ConnectionState, VolatileSettings};

/// Longest free-form text reply (`_d0`, `_d1`)
const TEXT_REPLY_MAX: usize = 100;

/// Timing of queries on an open connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout of each read attempt
    pub read_timeout: Duration,
    /// Read attempts per query before the reply counts as short
    pub query_attempts: u32,
    /// Gap between bytes for devices that need paced writes
    pub write_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1),
            query_attempts: 50,
            write_delay: PACED_WRITE_GAP,
        }
    }
}

/// An open (or reopenable) connection to one device
pub struct DeviceConnection {
    transport: Box<dyn Transport>,
    config: Arc<DeviceConfig>,
    settings: ConnectionConfig,
    minor_version: u8,
    raw: bool,
    state: ConnectionState,
    connection_lost: bool,
    codec: Option<ResponseCodec>,
    responses: ResponseQueue,
    lines: u16,
    volatile: VolatileSettings,
    pulse_table: PulseTable,
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("port", &self.transport.port_name())
            .field("device", &self.config.name())
            .field("state", &self.state)
            .field("connection_lost", &self.connection_lost)
            .finish()
    }
}

impl DeviceConnection {
    /// Wrap the transport of an already identified device
    pub fn new(transport: Box<dyn Transport>, config: Arc<DeviceConfig>, minor_version: u8) -> Self {
        Self::with_settings(transport, config, minor_version, ConnectionConfig::default())
    }

    /// Wrap an identified transport with custom query timing
    pub fn with_settings(
        transport: Box<dyn Transport>,
        config: Arc<DeviceConfig>,
        minor_version: u8,
        settings: ConnectionConfig,
    ) -> Self {
        let state = if transport.is_open() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let codec = config
            .capabilities()
            .reports_responses
            .then(|| ResponseCodec::new(PacketFormat::for_device(&config, minor_version)));

        Self {
            transport,
            config,
            settings,
            minor_version,
            raw: false,
            state,
            connection_lost: false,
            codec,
            responses: ResponseQueue::new(),
            lines: 0,
            volatile: VolatileSettings::default(),
            pulse_table: PulseTable::new(),
        }
    }

    /// Connection to a device whose identity is unknown
    ///
    /// No responses are decoded and every register operation is
    /// unsupported; only [`send_raw`](Self::send_raw),
    /// [`query_raw`](Self::query_raw) and the identification getters work.
    pub fn raw(transport: Box<dyn Transport>) -> Self {
        let config = Arc::new(DeviceConfig::new("Unidentified XID device", 0, 0, 0, 16, Vec::new()));
        let mut connection = Self::new(transport, config, 0);
        connection.raw = true;
        connection.codec = None;
        connection
    }

    /// Open the transport if needed, identify the device and look it up
    pub fn identify(transport: Box<dyn Transport>, table: &ConfigTable) -> Result<Self, DeviceError> {
        let mut connection = Self::raw(transport);
        if !connection.transport.is_open() {
            connection.transport.open()?;
        }
        connection.state = ConnectionState::Identifying;
        debug!("{}: identifying", connection.port_name());

        let prober = XidProber::with_config(ProbeConfig {
            read_timeout: connection.settings.read_timeout,
            ..Default::default()
        });
        let identification = prober.identify(connection.transport.as_mut())?;
        let (product, model, major) = identification.identity();
        let config = table.lookup(product, model, major)?;

        info!("{}: {} identified", connection.port_name(), config.name());
        Ok(Self::new(connection.transport, config, identification.minor_version))
    }

    /// Build a connection from a successful probe
    ///
    /// The probe's open transport is moved in; nothing is reopened.
    pub fn from_probe(probe: ProbeResult, table: &ConfigTable) -> Result<Self, DeviceError> {
        let ProbeResult {
            mut transport,
            identification,
        } = probe;
        let (product, model, major) = identification.identity();
        match table.lookup(product, model, major) {
            Ok(config) => Ok(Self::new(transport, config, identification.minor_version)),
            Err(e) => {
                transport.close();
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &Arc<DeviceConfig> {
        &self.config
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn port_name(&self) -> &str {
        self.transport.port_name()
    }

    /// Identity triple (product, model, major) fixed at construction
    pub fn identity(&self) -> (u8, u8, u8) {
        self.config.identity()
    }

    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether this connection runs without a config
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.transport.baud_rate()
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.settings
    }

    /// Settings written since the connection was opened
    pub fn settings(&self) -> &VolatileSettings {
        &self.volatile
    }

    /// Packet format responses are decoded with, if the device reports any
    pub fn packet_format(&self) -> Option<PacketFormat> {
        self.codec.as_ref().map(|c| c.format())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open (or reopen) the port
    ///
    /// Clears the lost-connection flag and any partially received packet.
    pub fn open(&mut self) -> Result<(), DeviceError> {
        self.state = ConnectionState::Disconnected;
        self.transport.open()?;
        self.connection_lost = false;
        if let Some(codec) = self.codec.as_mut() {
            codec.clear();
        }
        self.state = ConnectionState::Connected;
        debug!("{}: opened at {} baud", self.port_name(), self.baud_rate());
        Ok(())
    }

    /// Close the port; closing twice is harmless
    pub fn close(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Sticky until the next successful [`open`](Self::open)
    pub fn has_lost_connection(&self) -> bool {
        self.connection_lost
    }

    // ========================================================================
    // Low-level I/O
    // ========================================================================

    fn ensure_usable(&self) -> Result<(), DeviceError> {
        if self.connection_lost {
            return Err(DeviceError::ConnectionLost(self.port_name().to_string()));
        }
        if self.state != ConnectionState::Connected {
            return Err(DeviceError::NotConnected(self.port_name().to_string()));
        }
        Ok(())
    }

    fn lost(&mut self, e: TransportError) -> DeviceError {
        warn!("{}: connection lost: {}", self.port_name(), e);
        self.connection_lost = true;
        DeviceError::ConnectionLost(self.port_name().to_string())
    }

    fn write_gap(&self) -> Option<Duration> {
        self.config
            .capabilities()
            .needs_write_delay
            .then_some(self.settings.write_delay)
    }

    fn query_options(&self) -> QueryOptions {
        QueryOptions {
            read_timeout: self.settings.read_timeout,
            attempts: self.settings.query_attempts,
            ignore_zeros: false,
            write_gap: self.write_gap(),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.ensure_usable()?;
        trace!("{} <- {:02X?}", self.port_name(), bytes);
        let result = match self.write_gap() {
            Some(gap) => self.transport.write_paced(bytes, gap),
            None => self.transport.write(bytes),
        };
        result.map_err(|e| self.lost(e))
    }

    fn send(&mut self, command: XidCommand) -> Result<(), DeviceError> {
        self.write_bytes(&command.encode())
    }

    fn exchange_bytes(&mut self, bytes: &[u8], reply_len: usize) -> Result<Vec<u8>, DeviceError> {
        self.ensure_usable()?;
        let options = self.query_options();
        let result = exchange(self.transport.as_mut(), bytes, reply_len, &options);
        result.map_err(|e| self.lost(e))
    }

    fn query_value<T>(
        &mut self,
        command: XidCommand,
        parse: impl FnOnce(&XidCommand, &[u8]) -> Result<T, ParseError>,
    ) -> Result<T, DeviceError> {
        let reply = self.exchange_bytes(&command.encode(), command.reply_len())?;
        parse(&command, &reply).map_err(|e| invalid_reply(&command, &reply, e))
    }

    fn query_digit(&mut self, command: XidCommand, max: u8) -> Result<u8, DeviceError> {
        self.query_value(command, |c, r| reply::digit_value(c, r, max))
    }

    fn query_byte(&mut self, command: XidCommand) -> Result<u8, DeviceError> {
        self.query_value(command, reply::byte_value)
    }

    fn query_text(&mut self, command: XidCommand) -> Result<String, DeviceError> {
        self.ensure_usable()?;
        let options = self.query_options();
        let result = exchange_until_quiet(
            self.transport.as_mut(),
            &command.encode(),
            TEXT_REPLY_MAX,
            &options,
        );
        let reply = result.map_err(|e| self.lost(e))?;
        let text = reply::parse_text(&reply);
        if text.is_empty() {
            return Err(DeviceError::InvalidReply {
                command: command.name(),
                reply: "no reply".to_string(),
            });
        }
        Ok(text)
    }

    fn require(
        &self,
        register: &'static str,
        supported: impl FnOnce(&Capabilities) -> bool,
    ) -> Result<(), DeviceError> {
        if self.raw || !supported(self.config.capabilities()) {
            return Err(DeviceError::Unsupported {
                register,
                device: self.config.name().to_string(),
            });
        }
        Ok(())
    }

    fn check_lines(&self, register: &'static str, mask: u16) -> Result<(), DeviceError> {
        let allowed = self.config.output_lines_mask();
        if u32::from(mask) & !allowed != 0 {
            return Err(DeviceError::InvalidArgument {
                register,
                value: u32::from(mask),
                allowed: format!("mask within 0x{:X}", allowed),
            });
        }
        Ok(())
    }

    /// Send bytes as is
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.write_bytes(bytes)
    }

    /// Send bytes and collect up to `reply_len` reply bytes
    pub fn query_raw(&mut self, bytes: &[u8], reply_len: usize) -> Result<Vec<u8>, DeviceError> {
        self.exchange_bytes(bytes, reply_len)
    }

    // ========================================================================
    // Responses
    // ========================================================================

    /// Read what the device has sent and queue every complete response
    ///
    /// Returns the number of responses queued. Never waits longer than one
    /// read timeout.
    pub fn poll_for_response(&mut self) -> Result<usize, DeviceError> {
        self.ensure_usable()?;
        if self.codec.is_none() {
            return Ok(0);
        }

        let result = self.transport.read(READ_CHUNK, self.settings.read_timeout);
        let bytes = result.map_err(|e| self.lost(e))?;
        if bytes.is_empty() {
            return Ok(0);
        }
        trace!("{} -> {:02X?}", self.port_name(), bytes);

        let mut decoded = Vec::new();
        if let Some(codec) = self.codec.as_mut() {
            codec.push_bytes(&bytes);
            loop {
                match codec.decode() {
                    Decoded::Frame(response) => decoded.push(response),
                    Decoded::Malformed { .. } => continue,
                    Decoded::Incomplete { .. } => break,
                }
            }
        }

        let count = decoded.len();
        for response in decoded {
            let response = KeyResponse::mapped(response, &self.config);
            debug!(
                "{}: port {} key {:?} (raw {}) {} at {} ms",
                self.port_name(),
                response.port,
                response.key,
                response.raw_key,
                if response.pressed { "pressed" } else { "released" },
                response.reaction_time_ms
            );
            self.responses.push(response);
        }
        Ok(count)
    }

    pub fn has_queued_responses(&self) -> bool {
        !self.responses.is_empty()
    }

    /// Oldest queued response
    pub fn get_next_response(&mut self) -> Option<KeyResponse> {
        self.responses.pop()
    }

    pub fn get_number_of_keys_down(&self) -> usize {
        self.responses.keys_down()
    }

    /// Discard unread bytes on the port and any partial packet
    ///
    /// Already queued responses are kept.
    pub fn clear_responses_from_buffer(&mut self) -> Result<(), DeviceError> {
        self.ensure_usable()?;
        let result = self.transport.clear_input();
        result.map_err(|e| self.lost(e))?;
        if let Some(codec) = self.codec.as_mut() {
            codec.clear();
        }
        Ok(())
    }

    /// Empty the response queue and forget held keys
    pub fn clear_response_queue(&mut self) {
        self.responses.clear();
    }

    // ========================================================================
    // Identification
    // ========================================================================

    pub fn get_product_id(&mut self) -> Result<u8, DeviceError> {
        self.query_value(XidCommand::GetProductId, |_, r| reply::parse_product_id(r))
    }

    pub fn get_model_id(&mut self) -> Result<u8, DeviceError> {
        self.query_value(XidCommand::GetModelId, |_, r| reply::parse_model_id(r))
    }

    pub fn get_major_firmware_version(&mut self) -> Result<u8, DeviceError> {
        self.query_value(XidCommand::GetMajorVersion, |_, r| reply::parse_major_version(r))
    }

    pub fn get_minor_firmware_version(&mut self) -> Result<u8, DeviceError> {
        self.query_value(XidCommand::GetMinorVersion, |_, r| reply::parse_minor_version(r))
    }

    /// Whether the device still reports the identity this connection has
    pub fn verify_identity(&mut self) -> Result<bool, DeviceError> {
        let product = self.get_product_id()?;
        let model = self.get_model_id()?;
        let major = self.get_major_firmware_version()?;
        Ok(self.config.matches(product, model, major))
    }

    pub fn get_internal_product_name(&mut self) -> Result<String, DeviceError> {
        self.query_text(XidCommand::GetInternalName)
    }

    pub fn get_combined_info(&mut self) -> Result<String, DeviceError> {
        self.query_text(XidCommand::GetCombinedInfo)
    }

    pub fn get_outpost_model(&mut self) -> Result<u8, DeviceError> {
        self.require("outpost model", |c| c.xid2)?;
        self.query_byte(XidCommand::GetOutpostModel)
    }

    pub fn get_hardware_generation(&mut self) -> Result<u8, DeviceError> {
        self.require("hardware generation", |c| c.xid2)?;
        self.query_digit(XidCommand::GetHardwareGeneration, 9)
    }

    /// Protocol mode (0 = XID)
    pub fn get_protocol(&mut self) -> Result<u8, DeviceError> {
        self.query_value(XidCommand::GetProtocol, |_, r| reply::parse_protocol_mode(r))
    }

    pub fn set_protocol(&mut self, protocol: u8) -> Result<(), DeviceError> {
        check_range("protocol", protocol, 0..=4)?;
        self.send(XidCommand::SetProtocol { protocol })
    }

    /// Write a new model id to the device
    ///
    /// The identity of this connection does not change; a fresh scan picks
    /// up the new model.
    pub fn set_model_id(&mut self, model: u8) -> Result<(), DeviceError> {
        self.require("model id", |_| true)?;
        info!("{}: setting model id to '{}'", self.port_name(), model as char);
        self.send(XidCommand::SetModelId { model })
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn reset_base_timer(&mut self) -> Result<(), DeviceError> {
        self.send(XidCommand::ResetBaseTimer)
    }

    /// Milliseconds since the base timer was reset (XID1 only)
    pub fn query_base_timer(&mut self) -> Result<u32, DeviceError> {
        self.require("base timer", |c| c.xid1)?;
        self.query_value(XidCommand::QueryBaseTimer, reply::u32_value)
    }

    /// Milliseconds since the RT timer was reset (XID2 only)
    pub fn query_rt_timer(&mut self) -> Result<u32, DeviceError> {
        self.require("RT timer", |c| c.xid2)?;
        self.query_value(XidCommand::QueryRtTimer, reply::u32_value)
    }

    /// Reset the reaction-time timer; StimTracker 1 has none
    pub fn reset_rt_timer(&mut self) -> Result<(), DeviceError> {
        if self.config.capabilities().stimtracker1 {
            debug!("{}: no RT timer to reset", self.port_name());
            return Ok(());
        }
        self.send(XidCommand::ResetRtTimer)
    }

    // ========================================================================
    // Device-wide settings
    // ========================================================================

    /// Change the baud rate (selector 0..=4) and reopen the port at it
    pub fn set_baud_rate(&mut self, selector: u8) -> Result<(), DeviceError> {
        let rate = BaudRate::from_selector(selector).map_err(|_| DeviceError::InvalidArgument {
            register: "baud rate",
            value: u32::from(selector),
            allowed: "0..=4".to_string(),
        })?;
        if self.config.capabilities().mpod {
            debug!("{}: m-pods only talk at {}", self.port_name(), BaudRate::MPOD);
            return Ok(());
        }
        self.change_baud(rate)
    }

    fn change_baud(&mut self, rate: BaudRate) -> Result<(), DeviceError> {
        self.send(XidCommand::SetBaudRate { rate })?;
        info!("{}: switching to {} baud", self.port_name(), rate);
        self.transport.set_baud_rate(rate);
        self.close();
        self.open()
    }

    pub fn get_locking_level(&mut self) -> Result<u8, DeviceError> {
        self.require("locking level", |c| c.xid1)?;
        self.query_byte(XidCommand::GetLockingLevel)
    }

    pub fn set_locking_level(&mut self, level: u8) -> Result<(), DeviceError> {
        self.require("locking level", |c| c.xid1)?;
        self.send(XidCommand::SetLockingLevel { level })
    }

    pub fn reprogram_flash(&mut self) -> Result<(), DeviceError> {
        self.send(XidCommand::ReprogramFlash)
    }

    pub fn get_trigger_default(&mut self) -> Result<bool, DeviceError> {
        self.require("trigger default", |_| true)?;
        Ok(self.query_digit(XidCommand::GetTriggerDefault, 1)? == 1)
    }

    pub fn set_trigger_default(&mut self, on: bool) -> Result<(), DeviceError> {
        self.require("trigger default", |_| true)?;
        self.send(XidCommand::SetTriggerDefault { on })?;
        self.volatile.trigger_default = Some(on);
        Ok(())
    }

    pub fn get_trigger_debounce(&mut self) -> Result<u8, DeviceError> {
        self.require("trigger debounce", |_| true)?;
        self.query_byte(XidCommand::GetTriggerDebounce)
    }

    pub fn set_trigger_debounce(&mut self, ms: u8) -> Result<(), DeviceError> {
        self.require("trigger debounce", |_| true)?;
        self.send(XidCommand::SetTriggerDebounce { ms })?;
        self.volatile.trigger_debounce_ms = Some(ms);
        Ok(())
    }

    pub fn get_button_debounce(&mut self) -> Result<u8, DeviceError> {
        self.require("button debounce", |_| true)?;
        self.query_byte(XidCommand::GetButtonDebounce)
    }

    pub fn set_button_debounce(&mut self, ms: u8) -> Result<(), DeviceError> {
        self.require("button debounce", |_| true)?;
        self.send(XidCommand::SetButtonDebounce { ms })?;
        self.volatile.button_debounce_ms = Some(ms);
        Ok(())
    }

    /// Restore factory settings; the connection stays open
    pub fn restore_factory_defaults(&mut self) -> Result<(), DeviceError> {
        self.send(XidCommand::RestoreFactoryDefaults)?;
        self.volatile.clear();
        self.pulse_table.clear();
        info!("{}: factory defaults restored", self.port_name());
        Ok(())
    }

    pub fn save_settings(&mut self) -> Result<(), DeviceError> {
        self.send(XidCommand::SaveSettings)
    }

    // ========================================================================
    // XID1 input devices
    // ========================================================================

    pub fn get_output_logic(&mut self) -> Result<u8, DeviceError> {
        self.require("output logic", |c| c.xid1_input)?;
        self.query_digit(XidCommand::GetOutputLogic, 3)
    }

    pub fn set_output_logic(&mut self, mode: u8) -> Result<(), DeviceError> {
        self.require("output logic", |c| c.xid1_input)?;
        check_range("output logic", mode, 0..=3)?;
        self.send(XidCommand::SetOutputLogic { mode })?;
        self.volatile.output_logic = Some(mode);
        Ok(())
    }

    pub fn get_accessory_connector_mode(&mut self) -> Result<u8, DeviceError> {
        self.require("accessory connector mode", |c| c.xid1_input)?;
        self.query_digit(XidCommand::GetAccessoryConnectorMode, 3)
    }

    pub fn set_accessory_connector_mode(&mut self, mode: u8) -> Result<(), DeviceError> {
        self.require("accessory connector mode", |c| c.xid1_input)?;
        check_range("accessory connector mode", mode, 0..=3)?;
        self.send(XidCommand::SetAccessoryConnectorMode { mode })?;
        self.volatile.accessory_connector_mode = Some(mode);
        Ok(())
    }

    pub fn get_ac_debounce(&mut self) -> Result<u8, DeviceError> {
        self.require("AC debounce", |c| c.xid1_input)?;
        self.query_byte(XidCommand::GetAcDebounce)
    }

    pub fn set_ac_debounce(&mut self, ms: u8) -> Result<(), DeviceError> {
        self.require("AC debounce", |c| c.xid1_input)?;
        self.send(XidCommand::SetAcDebounce { ms })?;
        self.volatile.ac_debounce_ms = Some(ms);
        Ok(())
    }

    pub fn get_voice_key_drop_delay(&mut self) -> Result<u8, DeviceError> {
        self.require("voice key drop delay", |c| c.xid1_input)?;
        self.query_byte(XidCommand::GetVoiceKeyDropDelay)
    }

    pub fn set_voice_key_drop_delay(&mut self, delay: u8) -> Result<(), DeviceError> {
        self.require("voice key drop delay", |c| c.xid1_input)?;
        self.send(XidCommand::SetVoiceKeyDropDelay { delay })?;
        self.volatile.voice_key_drop_delay = Some(delay);
        Ok(())
    }

    // ========================================================================
    // XID2 devices
    // ========================================================================

    pub fn get_mpod_model(&mut self, mpod: u8) -> Result<u8, DeviceError> {
        self.require("m-pod model", |c| c.xid2)?;
        check_range("m-pod", mpod, 0..=9)?;
        self.query_byte(XidCommand::GetMpodModel { mpod })
    }

    /// Connect to (action 1) or disconnect from (action 0) an m-pod
    ///
    /// m-pods only talk at 19200 baud, so the link is switched first.
    pub fn connect_to_mpod(&mut self, mpod: u8, action: u8) -> Result<(), DeviceError> {
        self.require("connect to m-pod", |c| c.xid2)?;
        check_range("m-pod", mpod, 0..=9)?;
        check_range("m-pod action", action, 0..=1)?;
        if self.baud_rate() != BaudRate::MPOD {
            self.change_baud(BaudRate::MPOD)?;
        }
        self.send(XidCommand::ConnectToMpod { mpod, action })
    }

    pub fn get_mapped_signals(&mut self, line: u8) -> Result<u32, DeviceError> {
        self.require("signal mapping", |c| c.xid2)?;
        check_range("signal line", line, 0..=15)?;
        self.query_value(XidCommand::GetMappedSignals { line }, reply::hex_value)
    }

    pub fn map_signals(&mut self, line: u8, map: u32) -> Result<(), DeviceError> {
        self.require("signal mapping", |c| c.xid2)?;
        check_range("signal line", line, 0..=15)?;
        self.send(XidCommand::MapSignals { line, map })
    }

    pub fn reset_mapped_lines(&mut self) -> Result<(), DeviceError> {
        self.require("signal mapping", |c| c.xid2)?;
        self.send(XidCommand::ResetMappedLines)
    }

    pub fn commit_line_mapping(&mut self) -> Result<(), DeviceError> {
        self.require("signal mapping", |c| c.xid2)?;
        self.send(XidCommand::CommitLineMapping)
    }

    pub fn get_timer_reset_on_onset(&mut self, selector: u8) -> Result<u8, DeviceError> {
        self.require("timer reset on onset", |c| c.xid2)?;
        self.query_digit(XidCommand::GetTimerResetOnOnset { selector }, 9)
    }

    pub fn set_timer_reset_on_onset(&mut self, selector: u8, mode: u8) -> Result<(), DeviceError> {
        self.require("timer reset on onset", |c| c.xid2)?;
        check_range("timer reset on onset", mode, 0..=9)?;
        self.send(XidCommand::SetTimerResetOnOnset { selector, mode })
    }

    pub fn get_timestamped_output(&mut self, selector: u8) -> Result<u8, DeviceError> {
        self.require("timestamped output", |c| c.xid2)?;
        self.query_digit(XidCommand::GetTimestampedOutput { selector }, 9)
    }

    /// StimTracker 2 only
    pub fn set_timestamped_output(&mut self, selector: u8, mode: u8) -> Result<(), DeviceError> {
        self.require("timestamped output", |c| c.stimtracker2)?;
        check_range("timestamped output", mode, 0..=9)?;
        self.send(XidCommand::SetTimestampedOutput { selector, mode })
    }

    pub fn get_analog_threshold(&mut self, selector: u8) -> Result<u8, DeviceError> {
        self.require("analog input threshold", |c| c.xid2)?;
        self.query_byte(XidCommand::GetAnalogThreshold { selector })
    }

    pub fn set_analog_threshold(&mut self, selector: u8, threshold: u8) -> Result<(), DeviceError> {
        self.require("analog input threshold", |c| c.xid2)?;
        self.send(XidCommand::SetAnalogThreshold {
            selector,
            threshold,
        })
    }

    pub fn get_mpod_output_mode(&mut self, selector: u8) -> Result<u8, DeviceError> {
        self.require("m-pod output mode", |c| c.xid2)?;
        self.query_digit(XidCommand::GetMpodOutputMode { selector }, 9)
    }

    pub fn set_mpod_output_mode(&mut self, selector: u8, mode: u8) -> Result<(), DeviceError> {
        self.require("m-pod output mode", |c| c.xid2)?;
        check_range("m-pod output mode", mode, 0..=9)?;
        self.send(XidCommand::SetMpodOutputMode { selector, mode })
    }

    pub fn get_mixed_input_mode(&mut self) -> Result<u8, DeviceError> {
        self.require("mixed input mode", |c| c.xid2)?;
        self.query_digit(XidCommand::GetMixedInputMode, 2)
    }

    pub fn set_mixed_input_mode(&mut self, mode: u8) -> Result<(), DeviceError> {
        self.require("mixed input mode", |c| c.xid2)?;
        check_range("mixed input mode", mode, 0..=2)?;
        self.send(XidCommand::SetMixedInputMode { mode })?;
        self.volatile.mixed_input_mode = Some(mode);
        Ok(())
    }

    pub fn get_single_shot_mode(&mut self, selector: u8) -> Result<SingleShotMode, DeviceError> {
        self.require("single-shot mode", |c| c.xid2)?;
        self.query_value(XidCommand::GetSingleShotMode { selector }, reply::single_shot_value)
    }

    pub fn set_single_shot_mode(
        &mut self,
        selector: u8,
        mode: SingleShotMode,
    ) -> Result<(), DeviceError> {
        self.require("single-shot mode", |c| c.xid2)?;
        self.send(XidCommand::SetSingleShotMode { selector, mode })
    }

    pub fn get_signal_filter(&mut self, selector: u8) -> Result<SignalFilter, DeviceError> {
        self.require("signal filter", |c| c.xid2)?;
        self.query_value(XidCommand::GetSignalFilter { selector }, reply::signal_filter_value)
    }

    pub fn set_signal_filter(&mut self, selector: u8, filter: SignalFilter) -> Result<(), DeviceError> {
        self.require("signal filter", |c| c.xid2)?;
        self.send(XidCommand::SetSignalFilter { selector, filter })
    }

    pub fn get_enable_usb_output(&mut self, selector: u8) -> Result<bool, DeviceError> {
        self.require("USB output", |c| c.xid2)?;
        let mode = self.query_digit(XidCommand::GetEnableUsbOutput { selector }, 1)?;
        Ok(mode == 1)
    }

    pub fn set_enable_usb_output(&mut self, selector: u8, enabled: bool) -> Result<(), DeviceError> {
        self.require("USB output", |c| c.xid2)?;
        let mode = u8::from(enabled);
        self.send(XidCommand::SetEnableUsbOutput { selector, mode })
    }

    pub fn get_number_of_lines(&mut self) -> Result<u8, DeviceError> {
        self.require("number of lines", |c| c.xid2)?;
        self.query_byte(XidCommand::GetNumberOfLines)
    }

    pub fn set_number_of_lines(&mut self, lines: u8) -> Result<(), DeviceError> {
        self.require("number of lines", |c| c.xid2)?;
        check_range("number of lines", lines, 1..=16)?;
        self.send(XidCommand::SetNumberOfLines { lines })?;
        self.volatile.number_of_lines = Some(lines);
        Ok(())
    }

    // ========================================================================
    // Light sensor (RB-x40, Lumina)
    // ========================================================================

    pub fn get_light_sensor_mode(&mut self) -> Result<u8, DeviceError> {
        self.require("light sensor mode", |c| c.rb_x40 || c.lumina)?;
        self.query_digit(XidCommand::GetLightSensorMode, 3)
    }

    pub fn set_light_sensor_mode(&mut self, mode: u8) -> Result<(), DeviceError> {
        self.require("light sensor mode", |c| c.rb_x40 || c.lumina)?;
        check_range("light sensor mode", mode, 0..=3)?;
        self.send(XidCommand::SetLightSensorMode { mode })?;
        self.volatile.light_sensor_mode = Some(mode);
        Ok(())
    }

    pub fn get_light_sensor_threshold(&mut self) -> Result<u8, DeviceError> {
        self.require("light sensor threshold", |c| c.rb_x40 || c.lumina)?;
        self.query_byte(XidCommand::GetLightSensorThreshold)
    }

    pub fn set_light_sensor_threshold(&mut self, threshold: u8) -> Result<(), DeviceError> {
        self.require("light sensor threshold", |c| c.rb_x40 || c.lumina)?;
        self.send(XidCommand::SetLightSensorThreshold { threshold })?;
        self.volatile.light_sensor_threshold = Some(threshold);
        Ok(())
    }

    pub fn set_scanner_trigger_filter(&mut self, mode: u8) -> Result<(), DeviceError> {
        self.require("scanner trigger filter", |c| c.lumina)?;
        check_range("scanner trigger filter", mode, 0..=2)?;
        self.send(XidCommand::SetScannerTriggerFilter { mode })
    }

    // ========================================================================
    // Digital output
    // ========================================================================

    pub fn get_pulse_duration(&mut self) -> Result<u32, DeviceError> {
        self.require("pulse duration", |c| !(c.xid1_input || c.mpod))?;
        self.query_value(XidCommand::GetPulseDuration, reply::u32_value)
    }

    /// How long raised lines stay up, in ms (0 = until lowered)
    pub fn set_pulse_duration(&mut self, ms: u32) -> Result<(), DeviceError> {
        self.require("pulse duration", |c| !(c.xid1_input || c.mpod))?;
        self.send(XidCommand::SetPulseDuration { ms })?;
        self.volatile.pulse_duration_ms = Some(ms);
        Ok(())
    }

    /// Lines last driven by this connection
    pub fn lines_state(&self) -> u16 {
        self.lines
    }

    fn drive_lines(&mut self, lines: u16) -> Result<(), DeviceError> {
        let command = if self.config.capabilities().uses_byte_lines_command() {
            XidCommand::SetLinesByte { lines: lines as u8 }
        } else {
            XidCommand::SetLinesWord { lines }
        };
        self.send(command)?;
        self.lines = lines;
        Ok(())
    }

    /// Raise the lines in `mask`
    ///
    /// With `leave_remaining` the lines already up stay up; otherwise only
    /// `mask` is up afterwards.
    pub fn raise_lines(&mut self, mask: u16, leave_remaining: bool) -> Result<(), DeviceError> {
        self.require("output lines", |_| true)?;
        self.check_lines("output lines", mask)?;
        if !self.pulse_table.is_empty() {
            warn!(
                "{}: raising lines 0x{:04X} with a pulse table loaded; lines it drives are locked",
                self.port_name(),
                mask
            );
        }
        let lines = if leave_remaining { mask | self.lines } else { mask };
        self.drive_lines(lines)
    }

    /// Lower the lines in `mask`
    ///
    /// With `leave_remaining` the other lines keep their state; otherwise
    /// every other output line is raised.
    pub fn lower_lines(&mut self, mask: u16, leave_remaining: bool) -> Result<(), DeviceError> {
        self.require("output lines", |_| true)?;
        self.check_lines("output lines", mask)?;
        let all = self.config.output_lines_mask() as u16;
        let lines = if leave_remaining {
            !mask & self.lines
        } else {
            !mask & all
        };
        self.drive_lines(lines)
    }

    pub fn clear_lines(&mut self) -> Result<(), DeviceError> {
        self.require("output lines", |_| true)?;
        self.drive_lines(0)
    }

    // ========================================================================
    // Pulse table
    // ========================================================================

    /// Entries added since the table was last cleared, in insertion order
    pub fn pulse_table(&self) -> &[PulseTableEntry] {
        self.pulse_table.entries()
    }

    pub fn clear_pulse_table(&mut self) -> Result<(), DeviceError> {
        self.require("pulse table", |c| c.xid2)?;
        self.send(XidCommand::ClearPulseTable)?;
        self.pulse_table.clear();
        Ok(())
    }

    /// Add an entry locally; it is sent by [`run_pulse_table`](Self::run_pulse_table)
    ///
    /// `(0, 0)` marks the end of a table and is not stored.
    pub fn add_pulse_table_entry(&mut self, offset_ms: u32, lines: u16) -> Result<(), DeviceError> {
        self.require("pulse table", |c| c.xid2)?;
        self.check_lines("pulse table entry", lines)?;
        if !self.pulse_table.push(PulseTableEntry::new(offset_ms, lines)) {
            debug!("{}: ignoring pulse table terminator", self.port_name());
        }
        Ok(())
    }

    /// Load the table onto the device in offset order and start it
    pub fn run_pulse_table(&mut self) -> Result<(), DeviceError> {
        self.require("pulse table", |c| c.xid2)?;
        self.send(XidCommand::ClearPulseTable)?;
        let entries = self.pulse_table.sorted();
        for entry in entries.iter().chain(std::iter::once(&PulseTableEntry::TERMINATOR)) {
            self.send(XidCommand::AddPulseTableEntry {
                offset_ms: entry.offset_ms,
                lines: entry.lines,
            })?;
        }
        debug!("{}: running pulse table of {} entries", self.port_name(), entries.len());
        self.send(XidCommand::RunPulseTable)
    }

    pub fn stop_pulse_table(&mut self) -> Result<(), DeviceError> {
        self.require("pulse table", |c| c.xid2)?;
        self.send(XidCommand::StopPulseTable)
    }

    pub fn is_pulse_table_running(&mut self) -> Result<bool, DeviceError> {
        self.require("pulse table", |c| c.xid2)?;
        Ok(self.query_digit(XidCommand::IsPulseTableRunning, 1)? == 1)
    }

    pub fn get_pulse_table_bitmask(&mut self) -> Result<u16, DeviceError> {
        self.require("pulse table bitmask", |c| c.xid2)?;
        self.query_value(XidCommand::GetPulseTableBitmask, reply::u16_value)
    }

    /// Lines the pulse table drives
    pub fn set_pulse_table_bitmask(&mut self, lines: u16) -> Result<(), DeviceError> {
        self.require("pulse table bitmask", |c| c.xid2)?;
        self.check_lines("pulse table bitmask", lines)?;
        self.send(XidCommand::SetPulseTableBitmask { lines })?;
        self.volatile.pulse_table_bitmask = Some(lines);
        Ok(())
    }

    /// Drop every output line, pulse table lines included
    pub fn reset_output_lines(&mut self) -> Result<(), DeviceError> {
        self.require("output lines", |c| c.xid2)?;
        self.send(XidCommand::ResetOutputLines)?;
        self.lines = 0;
        Ok(())
    }
}

fn check_range(register: &'static str, value: u8, allowed: RangeInclusive<u8>) -> Result<(), DeviceError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(DeviceError::InvalidArgument {
            register,
            value: u32::from(value),
            allowed: format!("{}..={}", allowed.start(), allowed.end()),
        })
    }
}

fn invalid_reply(command: &XidCommand, reply: &[u8], e: ParseError) -> DeviceError {
    DeviceError::InvalidReply {
        command: command.name(),
        reply: format!("{:?} ({})", String::from_utf8_lossy(reply), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xid_detect::PortProvider;
    use xid_sim::{SharedDevice, SimPorts, VirtualXidDevice};

    fn connect(name: &str, product: u8, model: u8, major: u8) -> (DeviceConnection, SharedDevice) {
        let mut ports = SimPorts::new();
        let device = ports.add("SIM0", VirtualXidDevice::new(name, product, model, major));
        let transport = ports.connect("SIM0", BaudRate::B115200).unwrap();
        let connection = DeviceConnection::identify(transport, &ConfigTable::builtin()).unwrap();
        (connection, device)
    }

    fn rb840() -> (DeviceConnection, SharedDevice) {
        connect("RB-840", b'2', b'3', 2)
    }

    fn stimtracker_duo() -> (DeviceConnection, SharedDevice) {
        connect("StimTracker Duo", b'S', b'1', 2)
    }

    #[test]
    fn test_identify_rb_840() {
        let (connection, _) = rb840();
        assert_eq!(connection.name(), "RB-840");
        assert_eq!(connection.identity(), (b'2', b'3', 2));
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connection.packet_format(), Some(PacketFormat::Xid));
    }

    #[test]
    fn test_identify_unknown_device() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", VirtualXidDevice::new("Mystery", b'2', b'9', 2));
        let transport = ports.connect("SIM0", BaudRate::B115200).unwrap();
        assert!(matches!(
            DeviceConnection::identify(transport, &ConfigTable::builtin()),
            Err(DeviceError::UnknownDevice { model: b'9', .. })
        ));
    }

    #[test]
    fn test_raw_mode() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", VirtualXidDevice::new("Mystery", b'2', b'9', 2));
        let transport = ports.connect("SIM0", BaudRate::B115200).unwrap();
        let mut connection = DeviceConnection::raw(transport);

        assert!(connection.is_raw());
        assert_eq!(connection.poll_for_response().unwrap(), 0);
        assert!(matches!(
            connection.raise_lines(1, false),
            Err(DeviceError::Unsupported { .. })
        ));
        assert_eq!(connection.query_raw(b"_d3", 1).unwrap(), b"9");
        assert_eq!(connection.get_model_id().unwrap(), b'9');
    }

    #[test]
    fn test_closed_connection_rejects_commands() {
        let (mut connection, _) = rb840();
        connection.close();
        connection.close();
        assert!(matches!(
            connection.set_trigger_debounce(10),
            Err(DeviceError::NotConnected(_))
        ));
        connection.open().unwrap();
        connection.set_trigger_debounce(10).unwrap();
    }

    #[test]
    fn test_register_round_trip() {
        let (mut connection, device) = rb840();
        connection.set_trigger_debounce(42).unwrap();
        assert_eq!(connection.get_trigger_debounce().unwrap(), 42);
        assert_eq!(connection.settings().trigger_debounce_ms, Some(42));
        assert_eq!(device.lock().unwrap().register(b"_f5"), Some(&[42u8][..]));
    }

    #[test]
    fn test_setter_validation_sends_nothing() {
        let (mut connection, device) = rb840();
        device.lock().unwrap().clear_commands();

        assert!(matches!(
            connection.set_light_sensor_mode(4),
            Err(DeviceError::InvalidArgument { register: "light sensor mode", value: 4, .. })
        ));
        assert!(matches!(
            connection.set_protocol(5),
            Err(DeviceError::InvalidArgument { .. })
        ));
        assert!(matches!(
            connection.set_number_of_lines(0),
            Err(DeviceError::InvalidArgument { .. })
        ));
        assert!(matches!(
            connection.raise_lines(0x100, false),
            Err(DeviceError::InvalidArgument { .. })
        ));
        assert!(device.lock().unwrap().commands().is_empty());
    }

    #[test]
    fn test_family_guards() {
        let (mut connection, device) = rb840();
        device.lock().unwrap().clear_commands();

        // XID1-only registers on an XID2 pad
        assert!(matches!(
            connection.set_output_logic(1),
            Err(DeviceError::Unsupported { register: "output logic", .. })
        ));
        assert!(matches!(
            connection.query_base_timer(),
            Err(DeviceError::Unsupported { .. })
        ));
        assert!(matches!(
            connection.set_timestamped_output(b'1', 1),
            Err(DeviceError::Unsupported { .. })
        ));
        assert!(device.lock().unwrap().commands().is_empty());
    }

    #[test]
    fn test_xid1_registers() {
        let (mut connection, device) = connect("RB-830", b'2', b'3', 1);
        connection.set_accessory_connector_mode(2).unwrap();
        assert_eq!(connection.get_accessory_connector_mode().unwrap(), 2);
        connection.reset_base_timer().unwrap();
        assert!(connection.query_base_timer().unwrap() < 1_000);

        // RB-x30 commands go out one byte per write
        let before = device.lock().unwrap().write_calls();
        connection.set_button_debounce(5).unwrap();
        assert_eq!(device.lock().unwrap().write_calls(), before + 3);
    }

    #[test]
    fn test_input_registers_round_trip() {
        let (mut connection, device) = rb840();
        let sensor = b'A';

        let mode = SingleShotMode {
            enabled: true,
            delay: 300,
        };
        connection.set_single_shot_mode(sensor, mode).unwrap();
        assert_eq!(connection.get_single_shot_mode(sensor).unwrap(), mode);

        let filter = SignalFilter {
            hold_on: 2,
            hold_off: 40,
        };
        connection.set_signal_filter(sensor, filter).unwrap();
        assert_eq!(connection.get_signal_filter(sensor).unwrap(), filter);
        // Another selector keeps its defaults
        assert_eq!(connection.get_signal_filter(b'B').unwrap(), SignalFilter::default());

        assert!(!connection.get_enable_usb_output(sensor).unwrap());
        connection.set_enable_usb_output(sensor, true).unwrap();
        assert!(connection.get_enable_usb_output(sensor).unwrap());
        assert_eq!(device.lock().unwrap().register(b"_iuA"), Some(&b"1"[..]));

        connection.reset_rt_timer().unwrap();
        assert!(connection.query_rt_timer().unwrap() < 1_000);
    }

    #[test]
    fn test_xid2_registers_rejected_on_xid1() {
        let (mut connection, device) = connect("RB-830", b'2', b'3', 1);
        device.lock().unwrap().clear_commands();

        assert!(matches!(
            connection.set_number_of_lines(8),
            Err(DeviceError::Unsupported { register: "number of lines", .. })
        ));
        assert!(matches!(
            connection.get_number_of_lines(),
            Err(DeviceError::Unsupported { .. })
        ));
        assert!(matches!(
            connection.get_signal_filter(b'A'),
            Err(DeviceError::Unsupported { .. })
        ));
        assert!(matches!(
            connection.set_single_shot_mode(b'A', SingleShotMode::default()),
            Err(DeviceError::Unsupported { .. })
        ));
        assert!(matches!(
            connection.query_rt_timer(),
            Err(DeviceError::Unsupported { .. })
        ));
        assert!(device.lock().unwrap().commands().is_empty());
    }

    #[test]
    fn test_lines_use_byte_command_on_rb() {
        let (mut connection, device) = rb840();
        connection.raise_lines(0x05, false).unwrap();
        connection.raise_lines(0x02, true).unwrap();
        assert_eq!(connection.lines_state(), 0x07);
        connection.lower_lines(0x01, true).unwrap();
        assert_eq!(connection.lines_state(), 0x06);

        let device = device.lock().unwrap();
        assert_eq!(device.lines(), 0x06);
        assert_eq!(device.commands_starting_with(b"ah").len(), 3);
        assert!(device.commands_starting_with(b"mh").is_empty());
    }

    #[test]
    fn test_lower_lines_without_leave_raises_the_rest() {
        let (mut connection, _) = rb840();
        connection.lower_lines(0x01, false).unwrap();
        assert_eq!(connection.lines_state(), 0xFE);
        connection.clear_lines().unwrap();
        assert_eq!(connection.lines_state(), 0);
    }

    #[test]
    fn test_lines_use_word_command_on_stimtracker() {
        let (mut connection, device) = stimtracker_duo();
        connection.raise_lines(0x8001, false).unwrap();
        let device = device.lock().unwrap();
        assert_eq!(device.lines(), 0x8001);
        assert_eq!(device.commands_starting_with(b"mh"), vec![vec![b'm', b'h', 0x01, 0x80]]);
    }

    #[test]
    fn test_pulse_table_runs_sorted() {
        let (mut connection, device) = stimtracker_duo();
        connection.add_pulse_table_entry(300, 0x4).unwrap();
        connection.add_pulse_table_entry(0, 0).unwrap();
        connection.add_pulse_table_entry(100, 0x1).unwrap();
        connection.add_pulse_table_entry(200, 0x2).unwrap();
        assert_eq!(connection.pulse_table().len(), 3);

        connection.run_pulse_table().unwrap();
        assert!(connection.is_pulse_table_running().unwrap());

        let device = device.lock().unwrap();
        assert_eq!(device.pulse_table(), &[(100, 0x1), (200, 0x2), (300, 0x4)]);
        let sent = device.commands_starting_with(b"mt");
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[3], vec![b'm', b't', 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_pulse_table_bitmask() {
        let (mut connection, _) = stimtracker_duo();
        connection.set_pulse_table_bitmask(0x00FF).unwrap();
        assert_eq!(connection.get_pulse_table_bitmask().unwrap(), 0x00FF);
        connection.stop_pulse_table().unwrap();
        assert!(!connection.is_pulse_table_running().unwrap());
    }

    #[test]
    fn test_factory_defaults_clear_cache() {
        let (mut connection, _) = stimtracker_duo();
        connection.set_pulse_duration(250).unwrap();
        connection.add_pulse_table_entry(10, 1).unwrap();
        connection.restore_factory_defaults().unwrap();

        assert_eq!(connection.settings(), &VolatileSettings::default());
        assert!(connection.pulse_table().is_empty());
        assert!(connection.is_open());
        assert_eq!(connection.get_pulse_duration().unwrap(), 0);
    }

    #[test]
    fn test_set_baud_rate_reopens() {
        let (mut connection, device) = rb840();
        assert!(matches!(
            connection.set_baud_rate(5),
            Err(DeviceError::InvalidArgument { register: "baud rate", .. })
        ));
        connection.set_baud_rate(1).unwrap();
        assert_eq!(connection.baud_rate(), BaudRate::B19200);
        assert_eq!(device.lock().unwrap().baud(), BaudRate::B19200);
        assert_eq!(connection.get_product_id().unwrap(), b'2');
    }

    #[test]
    fn test_set_model_id_keeps_identity() {
        let (mut connection, device) = rb840();
        connection.set_model_id(b'4').unwrap();
        assert_eq!(device.lock().unwrap().identity(), (b'2', b'4', 2));
        assert_eq!(connection.identity(), (b'2', b'3', 2));
        assert!(!connection.verify_identity().unwrap());
    }

    #[test]
    fn test_text_queries() {
        let (mut connection, _) = rb840();
        assert_eq!(connection.get_internal_product_name().unwrap(), "RB-840");
        assert!(connection.get_combined_info().unwrap().starts_with("RB-840"));
    }

    #[test]
    fn test_write_failure_is_sticky() {
        let (mut connection, device) = rb840();
        device.lock().unwrap().set_fail_writes(true);
        assert!(matches!(
            connection.reset_rt_timer(),
            Err(DeviceError::ConnectionLost(_))
        ));
        device.lock().unwrap().set_fail_writes(false);
        assert!(connection.has_lost_connection());
        assert!(matches!(
            connection.reset_rt_timer(),
            Err(DeviceError::ConnectionLost(_))
        ));

        connection.open().unwrap();
        assert!(!connection.has_lost_connection());
        connection.reset_rt_timer().unwrap();
    }
}
