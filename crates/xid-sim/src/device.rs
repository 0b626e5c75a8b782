//! Virtual XID firmware
//!
//! Interprets the byte stream a host writes, answers queries the way real
//! firmware does, keeps register state, and emits response packets when
//! keys are pressed.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use xid_protocol::{
    encode_response, BaudRate, Capabilities, DeviceConfig, PacketFormat, Response,
};

/// Configuration for creating a virtual device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualDeviceConfig {
    /// Name reported by `_d1`
    pub name: String,
    pub product_id: u8,
    pub model_id: u8,
    pub major_version: u8,
    pub minor_version: u8,
    /// Number of digital output lines
    pub output_lines: u8,
    /// Baud rate the device listens at
    pub baud: BaudRate,
    /// Protocol mode at power-up (0 = XID)
    pub protocol_mode: u8,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self {
            name: "RB-840".to_string(),
            product_id: b'2',
            model_id: b'3',
            major_version: 2,
            minor_version: 0,
            output_lines: 8,
            baud: BaudRate::B115200,
            protocol_mode: 0,
        }
    }
}

/// Length check result for the command framer
enum Frame {
    Complete(usize),
    Partial,
    Unknown,
}

/// Split the next command off the input buffer
fn frame(buf: &[u8]) -> Frame {
    let (query, code) = match buf {
        [b'_', a, b, ..] => (true, [*a, *b]),
        [b'_', ..] | [_] | [] => return Frame::Partial,
        [a, b, ..] => (false, [*a, *b]),
    };

    let len = if query {
        match &code {
            b"aq" | b"at" | b"ir" | b"io" | b"it" | b"im" | b"ia" | b"if" | b"iu" => 4,
            b"a0" | b"a1" | b"a6" | b"b3" | b"c1" | b"d0" | b"d1" | b"d2" | b"d3" | b"d4"
            | b"d5" | b"d6" | b"d7" | b"e5" | b"f2" | b"f4" | b"f5" | b"f6" | b"iv" | b"lr"
            | b"lt" | b"ml" | b"mp" | b"mk" | b"mr" => 3,
            _ => return Frame::Unknown,
        }
    } else {
        match &code {
            b"af" | b"e1" | b"e3" | b"e5" | b"f3" | b"f7" | b"f9" | b"mc" | b"mr" | b"ms"
            | b"mz" => 2,
            b"a0" | b"a1" | b"a6" | b"b3" | b"c1" | b"d3" | b"f1" | b"f2" | b"f4" | b"f5"
            | b"f6" | b"iv" | b"lr" | b"lt" | b"ts" | b"ml" | b"ah" => 3,
            b"aq" | b"ir" | b"io" | b"it" | b"im" | b"iu" | b"mh" | b"mk" => 4,
            b"mp" => 6,
            b"mt" | b"ia" => 8,
            b"if" => 11,
            b"at" => match buf.get(2) {
                None => return Frame::Partial,
                Some(b'X') => 3,
                Some(_) => 11,
            },
            _ => return Frame::Unknown,
        }
    };

    if buf.len() >= len {
        Frame::Complete(len)
    } else {
        Frame::Partial
    }
}

/// Value a register query answers with before anything was set
fn default_value(key: &[u8]) -> Vec<u8> {
    match key.get(1..3) {
        Some(b"at") => b"00000000".to_vec(),
        Some(b"a6") | Some(b"f5") | Some(b"lt") => vec![100],
        Some(b"f6") => vec![20],
        Some(b"b3") => vec![25],
        Some(b"f2") | Some(b"it") => vec![0],
        Some(b"ia") => vec![b'0', 0, 0, 0, 0],
        Some(b"if") => vec![0; 8],
        _ => vec![b'0'],
    }
}

/// A simulated XID device
#[derive(Debug)]
pub struct VirtualXidDevice {
    config: VirtualDeviceConfig,
    capabilities: Capabilities,
    packet_format: PacketFormat,
    protocol_mode: u8,
    baud: BaudRate,
    /// Query key (e.g. `_f5`, `_it3`) -> value bytes
    registers: HashMap<Vec<u8>, Vec<u8>>,
    lines: u16,
    number_of_lines: u8,
    pulse_duration: u32,
    pulse_mask: u16,
    pulse_table: Vec<(u32, u16)>,
    pulse_table_running: bool,
    connected_mpod: Option<u8>,
    base_timer_start: Instant,
    rt_timer_start: Instant,
    input: Vec<u8>,
    output: VecDeque<u8>,
    /// Every complete command received (for test verification)
    commands: Vec<Vec<u8>>,
    write_calls: usize,
    fail_reads: bool,
    fail_writes: bool,
    unplugged: bool,
}

impl VirtualXidDevice {
    /// Create a virtual device with an identity and defaults for the rest
    pub fn new(name: impl Into<String>, product_id: u8, model_id: u8, major_version: u8) -> Self {
        Self::from_config(VirtualDeviceConfig {
            name: name.into(),
            product_id,
            model_id,
            major_version,
            ..Default::default()
        })
    }

    /// Create a virtual device matching a catalog entry
    pub fn for_model(config: &DeviceConfig) -> Self {
        Self::from_config(VirtualDeviceConfig {
            name: config.name().to_string(),
            product_id: config.product_id(),
            model_id: config.model_id(),
            major_version: config.major_version(),
            output_lines: config.output_lines(),
            ..Default::default()
        })
    }

    /// Create a virtual device from configuration
    pub fn from_config(config: VirtualDeviceConfig) -> Self {
        let capabilities =
            Capabilities::derive(config.product_id, config.model_id, config.major_version);
        let identity = DeviceConfig::new(
            config.name.clone(),
            config.product_id,
            config.model_id,
            config.major_version,
            config.output_lines,
            Vec::new(),
        );
        let packet_format = PacketFormat::for_device(&identity, config.minor_version);
        let now = Instant::now();

        Self {
            capabilities,
            packet_format,
            protocol_mode: config.protocol_mode,
            baud: config.baud,
            registers: HashMap::new(),
            lines: 0,
            number_of_lines: config.output_lines,
            pulse_duration: 0,
            pulse_mask: 0,
            pulse_table: Vec::new(),
            pulse_table_running: false,
            connected_mpod: None,
            base_timer_start: now,
            rt_timer_start: now,
            input: Vec::new(),
            output: VecDeque::new(),
            commands: Vec::new(),
            write_calls: 0,
            fail_reads: false,
            fail_writes: false,
            unplugged: false,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Identity triple as the device currently reports it
    pub fn identity(&self) -> (u8, u8, u8) {
        (
            self.config.product_id,
            self.config.model_id,
            self.config.major_version,
        )
    }

    pub fn baud(&self) -> BaudRate {
        self.baud
    }

    pub fn protocol_mode(&self) -> u8 {
        self.protocol_mode
    }

    /// Current state of the output lines
    pub fn lines(&self) -> u16 {
        self.lines
    }

    pub fn pulse_duration(&self) -> u32 {
        self.pulse_duration
    }

    pub fn pulse_table(&self) -> &[(u32, u16)] {
        &self.pulse_table
    }

    pub fn pulse_table_running(&self) -> bool {
        self.pulse_table_running
    }

    pub fn connected_mpod(&self) -> Option<u8> {
        self.connected_mpod
    }

    /// Raw value of a register, keyed by its query (e.g. `b"_f5"`)
    pub fn register(&self, key: &[u8]) -> Option<&[u8]> {
        self.registers.get(key).map(Vec::as_slice)
    }

    /// Preset a register value
    pub fn set_register(&mut self, key: &[u8], value: &[u8]) {
        self.registers.insert(key.to_vec(), value.to_vec());
    }

    /// Every complete command received so far
    pub fn commands(&self) -> &[Vec<u8>] {
        &self.commands
    }

    /// Commands starting with a prefix
    pub fn commands_starting_with(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.commands
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of write calls the host made (paced writes make one per byte)
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    /// Make every read fail, as an unplugged USB device does
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make every write fail
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make opening the port fail
    pub fn set_unplugged(&mut self, unplugged: bool) {
        self.unplugged = unplugged;
    }

    pub fn fail_reads(&self) -> bool {
        self.fail_reads
    }

    pub fn fail_writes(&self) -> bool {
        self.fail_writes
    }

    pub fn unplugged(&self) -> bool {
        self.unplugged
    }

    /// Queue a response packet as if a key changed state
    pub fn queue_response(&mut self, response: Response) {
        if !self.capabilities.reports_responses {
            debug!("{} has no response ports, ignoring {:?}", self.name(), response);
            return;
        }
        let packet = encode_response(self.packet_format, &response);
        trace!("{} -> response {:02X?}", self.name(), packet);
        self.output.extend(packet);
    }

    /// Press a key, timestamped against the RT timer
    pub fn press_key(&mut self, port: u8, key: u8) {
        self.key_event(port, key, true);
    }

    /// Release a key, timestamped against the RT timer
    pub fn release_key(&mut self, port: u8, key: u8) {
        self.key_event(port, key, false);
    }

    fn key_event(&mut self, port: u8, key: u8, pressed: bool) {
        let reaction_time_ms = self.rt_timer_start.elapsed().as_millis() as u32;
        self.queue_response(Response {
            port,
            key,
            pressed,
            reaction_time_ms,
        });
    }

    /// Append raw bytes to the device output (line noise, stray bytes)
    pub fn inject_output(&mut self, bytes: &[u8]) {
        self.output.extend(bytes.iter().copied());
    }

    /// Bytes waiting to be read by the host
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    /// Host -> device bytes
    pub fn receive(&mut self, bytes: &[u8]) {
        self.write_calls += 1;
        self.input.extend_from_slice(bytes);

        loop {
            match frame(&self.input) {
                Frame::Complete(len) => {
                    let command: Vec<u8> = self.input.drain(..len).collect();
                    self.execute(&command);
                }
                Frame::Partial => break,
                Frame::Unknown => {
                    let dropped = self.input.remove(0);
                    debug!("{}: ignoring byte 0x{:02X}", self.name(), dropped);
                }
            }
        }
    }

    /// Device -> host bytes, at most `max`
    pub fn transmit(&mut self, max: usize) -> Vec<u8> {
        let mut out = Vec::new();
        // Outside XID mode the firmware streams zeros
        if self.protocol_mode != 0 {
            out.extend([0u8; 4].iter().take(max));
        }
        while out.len() < max {
            match self.output.pop_front() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        out
    }

    /// Discard unread device output
    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Change the listening baud rate, as `f1` does
    pub fn set_baud(&mut self, baud: BaudRate) {
        self.baud = baud;
    }

    fn execute(&mut self, command: &[u8]) {
        trace!("{} <- {:02X?}", self.name(), command);
        self.commands.push(command.to_vec());

        if command[0] == b'_' {
            let reply = self.answer(command);
            self.output.extend(reply);
            return;
        }

        let code = [command[0], command[1]];
        let arg = &command[2..];
        match &code {
            b"c1" => self.protocol_mode = arg[0].wrapping_sub(b'0'),
            b"d3" => self.config.model_id = arg[0],
            b"f1" => {
                if self.capabilities.mpod {
                    debug!("{}: m-pods stay at 19200 baud", self.name());
                } else if let Ok(rate) = BaudRate::from_selector(arg[0]) {
                    debug!("{}: switching to {} baud", self.name(), rate);
                    self.baud = rate;
                }
            }
            b"e1" => self.base_timer_start = Instant::now(),
            b"e3" => {
                let ms = self.base_timer_start.elapsed().as_millis() as u32;
                self.output.extend(b"e3".iter().copied());
                self.output.extend(ms.to_le_bytes());
            }
            b"e5" => self.rt_timer_start = Instant::now(),
            b"f7" => self.restore_defaults(),
            b"f3" | b"f9" | b"af" => {}
            b"ah" => self.lines = u16::from(arg[0]),
            b"mh" => self.lines = u16::from_le_bytes([arg[0], arg[1]]),
            b"ml" => self.number_of_lines = arg[0],
            b"mp" => self.pulse_duration = u32::from_le_bytes([arg[0], arg[1], arg[2], arg[3]]),
            b"mk" => self.pulse_mask = u16::from_le_bytes([arg[0], arg[1]]),
            b"mc" => self.pulse_table.clear(),
            b"mt" => {
                let offset = u32::from_le_bytes([arg[0], arg[1], arg[2], arg[3]]);
                let lines = u16::from_le_bytes([arg[4], arg[5]]);
                if (offset, lines) != (0, 0) {
                    self.pulse_table.push((offset, lines));
                }
            }
            b"mr" => self.pulse_table_running = true,
            b"ms" => self.pulse_table_running = false,
            b"mz" => self.lines = 0,
            b"aq" => {
                let mpod = arg[0].wrapping_sub(b'0');
                self.connected_mpod = (arg[1] == b'1').then_some(mpod);
            }
            b"at" if arg == b"X" => {
                self.registers.retain(|k, _| !k.starts_with(b"_at"));
            }
            b"at" => {
                let mut key = b"_at".to_vec();
                key.push(arg[0]);
                self.registers.insert(key, arg[1..].to_vec());
            }
            b"ir" | b"io" | b"it" | b"im" | b"ia" | b"if" | b"iu" => {
                let key = vec![b'_', code[0], code[1], arg[0]];
                self.registers.insert(key, arg[1..].to_vec());
            }
            _ => {
                let key = vec![b'_', code[0], code[1]];
                self.registers.insert(key, arg.to_vec());
            }
        }
    }

    fn answer(&self, query: &[u8]) -> Vec<u8> {
        let mut reply = query.to_vec();
        match &query[1..3] {
            b"c1" => return format!("_xid{}", self.protocol_mode).into_bytes(),
            b"d0" => return format!("{}\rXID{}\r", self.name(), self.config.major_version).into_bytes(),
            b"d1" => return format!("{}\r", self.name()).into_bytes(),
            b"d2" => return vec![self.config.product_id],
            b"d3" => return vec![self.config.model_id],
            b"d4" => return vec![b'0' + self.config.major_version],
            b"d5" => return vec![b'0' + self.config.minor_version],
            b"d6" => return vec![b'0'],
            b"d7" => return vec![b'1'],
            b"ml" => reply.push(self.number_of_lines),
            b"e5" => {
                let ms = self.rt_timer_start.elapsed().as_millis() as u32;
                reply.extend(ms.to_le_bytes());
            }
            b"mp" => reply.extend(self.pulse_duration.to_le_bytes()),
            b"mk" => reply.extend(self.pulse_mask.to_le_bytes()),
            b"mr" => reply.push(if self.pulse_table_running { b'1' } else { b'0' }),
            _ => {
                let value = self
                    .registers
                    .get(query)
                    .cloned()
                    .unwrap_or_else(|| default_value(query));
                reply.extend(value);
            }
        }
        reply
    }

    fn restore_defaults(&mut self) {
        debug!("{}: restoring factory defaults", self.name());
        self.registers.clear();
        self.number_of_lines = self.config.output_lines;
        self.pulse_duration = 0;
        self.pulse_mask = 0;
        self.pulse_table.clear();
        self.pulse_table_running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xid_protocol::{EncodeCommand, SignalFilter, XidCommand};

    fn send(device: &mut VirtualXidDevice, command: XidCommand) -> Vec<u8> {
        device.receive(&command.encode());
        device.transmit(256)
    }

    #[test]
    fn test_create_virtual_device() {
        let device = VirtualXidDevice::new("Test Pad", b'2', b'3', 2);
        assert_eq!(device.name(), "Test Pad");
        assert_eq!(device.identity(), (b'2', b'3', 2));
        assert_eq!(device.baud(), BaudRate::B115200);
        assert_eq!(device.lines(), 0);
    }

    #[test]
    fn test_identification_replies() {
        let mut device = VirtualXidDevice::new("RB-840", b'2', b'3', 2);
        assert_eq!(send(&mut device, XidCommand::GetProtocol), b"_xid0");
        assert_eq!(send(&mut device, XidCommand::GetProductId), b"2");
        assert_eq!(send(&mut device, XidCommand::GetModelId), b"3");
        assert_eq!(send(&mut device, XidCommand::GetMajorVersion), b"2");
        assert_eq!(send(&mut device, XidCommand::GetInternalName), b"RB-840\r");
    }

    #[test]
    fn test_register_round_trip() {
        let mut device = VirtualXidDevice::default_rb840();
        assert_eq!(send(&mut device, XidCommand::GetTriggerDebounce), vec![b'_', b'f', b'5', 100]);
        send(&mut device, XidCommand::SetTriggerDebounce { ms: 42 });
        assert_eq!(send(&mut device, XidCommand::GetTriggerDebounce), vec![b'_', b'f', b'5', 42]);
        assert_eq!(device.register(b"_f5"), Some(&[42u8][..]));
    }

    #[test]
    fn test_selector_registers() {
        let mut device = VirtualXidDevice::default_rb840();
        send(
            &mut device,
            XidCommand::SetAnalogThreshold {
                selector: b'2',
                threshold: 0x40,
            },
        );
        assert_eq!(
            send(&mut device, XidCommand::GetAnalogThreshold { selector: b'2' }),
            vec![b'_', b'i', b't', b'2', 0x40]
        );
        assert_eq!(
            send(&mut device, XidCommand::GetAnalogThreshold { selector: b'1' }),
            vec![b'_', b'i', b't', b'1', 0]
        );
    }

    #[test]
    fn test_input_filter_registers() {
        let mut device = VirtualXidDevice::default_rb840();
        assert_eq!(
            send(&mut device, XidCommand::GetSingleShotMode { selector: b'A' }),
            vec![b'_', b'i', b'a', b'A', b'0', 0, 0, 0, 0]
        );
        send(
            &mut device,
            XidCommand::SetSignalFilter {
                selector: b'A',
                filter: SignalFilter {
                    hold_on: 3,
                    hold_off: 7,
                },
            },
        );
        assert_eq!(
            send(&mut device, XidCommand::GetSignalFilter { selector: b'A' }),
            vec![b'_', b'i', b'f', b'A', 3, 0, 0, 0, 7, 0, 0, 0]
        );
        assert_eq!(device.commands().len(), 3);

        let rt = send(&mut device, XidCommand::QueryRtTimer);
        assert_eq!(rt.len(), 7);
        assert!(rt.starts_with(b"_e5"));
    }

    #[test]
    fn test_byte_at_a_time_input() {
        let mut device = VirtualXidDevice::default_rb840();
        for byte in (XidCommand::SetPulseDuration { ms: 500 }).encode() {
            device.receive(&[byte]);
        }
        assert_eq!(device.pulse_duration(), 500);
        assert_eq!(device.write_calls(), 6);
        assert_eq!(device.commands().len(), 1);
    }

    #[test]
    fn test_unknown_bytes_are_skipped() {
        let mut device = VirtualXidDevice::default_rb840();
        device.receive(b"zz_d2");
        assert_eq!(device.transmit(8), b"2");
    }

    #[test]
    fn test_signal_mapping_commands() {
        let mut device = VirtualXidDevice::default_rb840();
        send(&mut device, XidCommand::MapSignals { line: 11, map: 0xBEEF });
        assert_eq!(
            send(&mut device, XidCommand::GetMappedSignals { line: 11 }),
            b"_atB0000BEEF"
        );
        send(&mut device, XidCommand::ResetMappedLines);
        assert_eq!(
            send(&mut device, XidCommand::GetMappedSignals { line: 11 }),
            b"_atB00000000"
        );
    }

    #[test]
    fn test_pulse_table_commands() {
        let mut device = VirtualXidDevice::default_rb840();
        send(&mut device, XidCommand::AddPulseTableEntry { offset_ms: 0, lines: 1 });
        send(&mut device, XidCommand::AddPulseTableEntry { offset_ms: 500, lines: 0 });
        send(&mut device, XidCommand::AddPulseTableEntry { offset_ms: 0, lines: 0 });
        send(&mut device, XidCommand::RunPulseTable);
        assert_eq!(device.pulse_table(), &[(0, 1), (500, 0)]);
        assert_eq!(send(&mut device, XidCommand::IsPulseTableRunning), b"_mr1");
        send(&mut device, XidCommand::StopPulseTable);
        assert!(!device.pulse_table_running());
    }

    #[test]
    fn test_key_press_packets() {
        let mut device = VirtualXidDevice::default_rb840();
        device.queue_response(Response {
            port: 0,
            key: 3,
            pressed: true,
            reaction_time_ms: 1000,
        });
        assert_eq!(device.transmit(64), vec![b'k', 0x70, 0xE8, 0x03, 0x00, 0x00]);
    }

    #[test]
    fn test_non_input_device_sends_no_packets() {
        let mut device = VirtualXidDevice::new("m-pod", b'3', b'P', 2);
        device.press_key(0, 1);
        assert_eq!(device.pending_output(), 0);
    }

    #[test]
    fn test_mpod_ignores_baud_change() {
        let mut device = VirtualXidDevice::from_config(VirtualDeviceConfig {
            product_id: b'3',
            model_id: b'P',
            baud: BaudRate::B19200,
            ..Default::default()
        });
        send(&mut device, XidCommand::SetBaudRate { rate: BaudRate::B115200 });
        assert_eq!(device.baud(), BaudRate::B19200);
    }

    #[test]
    fn test_pst_mode_spews_zeros() {
        let mut device = VirtualXidDevice::from_config(VirtualDeviceConfig {
            protocol_mode: 1,
            ..Default::default()
        });
        assert_eq!(device.transmit(8), vec![0, 0, 0, 0]);
        device.receive(b"c10");
        assert_eq!(device.protocol_mode(), 0);
        assert!(device.transmit(8).is_empty());
    }

    #[test]
    fn test_factory_defaults() {
        let mut device = VirtualXidDevice::default_rb840();
        send(&mut device, XidCommand::SetButtonDebounce { ms: 5 });
        send(&mut device, XidCommand::SetPulseDuration { ms: 10 });
        send(&mut device, XidCommand::RestoreFactoryDefaults);
        assert_eq!(device.register(b"_f6"), None);
        assert_eq!(device.pulse_duration(), 0);
    }

    impl VirtualXidDevice {
        fn default_rb840() -> Self {
            Self::from_config(VirtualDeviceConfig::default())
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Commands split across writes at any point are framed the same
            #[test]
            fn split_commands_are_framed(
                masks in prop::collection::vec(any::<u8>(), 1..10),
                split in any::<prop::sample::Index>(),
            ) {
                let bytes: Vec<u8> = masks
                    .iter()
                    .flat_map(|&lines| XidCommand::SetLinesByte { lines }.encode())
                    .collect();
                let at = split.index(bytes.len() + 1);

                let mut device = VirtualXidDevice::default_rb840();
                device.receive(&bytes[..at]);
                device.receive(&bytes[at..]);

                prop_assert_eq!(device.commands().len(), masks.len());
                prop_assert_eq!(device.lines(), u16::from(masks[masks.len() - 1]));
            }
        }
    }
}
