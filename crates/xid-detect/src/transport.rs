//! Byte transport for XID devices
//!
//! [`Transport`] is the seam between the protocol layers and the operating
//! system: the serial implementation talks to real hardware, the simulator
//! implements it in memory. Reads are bounded by a per-call timeout and a
//! timeout is an empty read, never an error.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, trace};
use xid_protocol::BaudRate;

use crate::error::{DetectError, TransportError};
use crate::scanner::{PortScanner, SerialPortInfo};

/// Write timeout used by every serial port
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Gap between bytes for devices that cannot take back-to-back writes
pub const PACED_WRITE_GAP: Duration = Duration::from_millis(2);

/// Largest chunk read in one call
pub const READ_CHUNK: usize = 64;

/// A byte-oriented connection to one device
pub trait Transport: Send {
    /// Open at the configured baud rate and purge both directions
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the port; closing a closed port is a no-op
    fn close(&mut self);

    /// Read up to `max_bytes`, waiting at most `timeout`
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Write all bytes
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Write one byte at a time with `gap` between bytes
    fn write_paced(&mut self, bytes: &[u8], gap: Duration) -> Result<(), TransportError> {
        for (i, byte) in bytes.iter().enumerate() {
            self.write(std::slice::from_ref(byte))?;
            if i + 1 < bytes.len() {
                thread::sleep(gap);
            }
        }
        Ok(())
    }

    /// Discard bytes received but not yet read
    fn clear_input(&mut self) -> Result<(), TransportError>;

    /// Change the baud rate; takes effect on the next `open`
    fn set_baud_rate(&mut self, baud: BaudRate);

    fn baud_rate(&self) -> BaudRate;

    fn port_name(&self) -> &str;

    fn is_open(&self) -> bool;
}

/// Options for a single query exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Timeout of each read attempt
    pub read_timeout: Duration,
    /// Maximum number of read attempts
    pub attempts: u32,
    /// Drop zero bytes (devices in E-Prime/PST mode spew them)
    pub ignore_zeros: bool,
    /// Per-byte gap when writing the command
    pub write_gap: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1),
            attempts: 50,
            ignore_zeros: false,
            write_gap: None,
        }
    }
}

/// Send a command and collect up to `reply_len` reply bytes
///
/// Reading stops once `reply_len` bytes are stored or the attempts run
/// out; a short reply is returned as is. Bytes past `reply_len` in the
/// same read are discarded.
pub fn exchange(
    transport: &mut dyn Transport,
    command: &[u8],
    reply_len: usize,
    options: &QueryOptions,
) -> Result<Vec<u8>, TransportError> {
    match options.write_gap {
        Some(gap) => transport.write_paced(command, gap)?,
        None => transport.write(command)?,
    }
    trace!(
        "{} <- {:?}",
        transport.port_name(),
        String::from_utf8_lossy(command)
    );

    let mut reply = Vec::with_capacity(reply_len);
    let mut attempts = 0;
    while attempts < options.attempts && reply.len() < reply_len {
        let chunk = transport.read(READ_CHUNK, options.read_timeout)?;
        for byte in chunk {
            if reply.len() == reply_len {
                break;
            }
            if options.ignore_zeros && byte == 0 {
                continue;
            }
            reply.push(byte);
        }
        attempts += 1;
    }

    trace!("{} -> {:02X?}", transport.port_name(), reply);
    Ok(reply)
}

/// Collect everything the device sends until it goes quiet
///
/// Used for the free-form text queries whose length is not fixed.
pub fn exchange_until_quiet(
    transport: &mut dyn Transport,
    command: &[u8],
    max_len: usize,
    options: &QueryOptions,
) -> Result<Vec<u8>, TransportError> {
    match options.write_gap {
        Some(gap) => transport.write_paced(command, gap)?,
        None => transport.write(command)?,
    }

    let mut reply = Vec::new();
    let mut quiet = 0;
    let mut attempts = 0;
    while attempts < options.attempts && reply.len() < max_len {
        let chunk = transport.read(READ_CHUNK, options.read_timeout)?;
        if chunk.is_empty() {
            quiet += 1;
            // Give the device a few empty reads to start answering
            if !reply.is_empty() && quiet >= 3 {
                break;
            }
        } else {
            quiet = 0;
            let room = max_len - reply.len();
            reply.extend(chunk.into_iter().take(room));
        }
        attempts += 1;
    }
    Ok(reply)
}

/// Serial port transport (8N1, no flow control)
pub struct SerialTransport {
    port_name: String,
    baud: BaudRate,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a closed transport for a port
    pub fn new(port_name: impl Into<String>, baud: BaudRate) -> Self {
        Self {
            port_name: port_name.into(),
            baud,
            port: None,
        }
    }

    /// Open a port at a baud rate
    pub fn connect(port_name: impl Into<String>, baud: BaudRate) -> Result<Self, TransportError> {
        let mut transport = Self::new(port_name, baud);
        transport.open()?;
        Ok(transport)
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        let name = &self.port_name;
        self.port
            .as_mut()
            .ok_or_else(|| TransportError::NotOpen(name.clone()))
    }

    fn read_error(&self, e: impl std::fmt::Display) -> TransportError {
        TransportError::Read {
            port: self.port_name.clone(),
            reason: e.to_string(),
        }
    }

    fn write_error(&self, e: impl std::fmt::Display) -> TransportError {
        TransportError::Write {
            port: self.port_name.clone(),
            reason: e.to_string(),
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.close();

        debug!("Opening {} at {} baud", self.port_name, self.baud);
        let port = serialport::new(&self.port_name, self.baud.bits_per_second())
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Connect {
                port: self.port_name.clone(),
                reason: e.to_string(),
            })?;

        port.clear(ClearBuffer::All)
            .map_err(|e| TransportError::Connect {
                port: self.port_name.clone(),
                reason: e.to_string(),
            })?;

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.port_name);
        }
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let port = self.port_mut()?;
        if let Err(e) = port.set_timeout(timeout) {
            return Err(self.read_error(e));
        }

        let port = self.port_mut()?;
        let mut buf = vec![0u8; max_bytes];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(Vec::new())
            }
            Err(e) => Err(self.read_error(e)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port_mut()?;
        let result = port
            .set_timeout(WRITE_TIMEOUT)
            .map_err(io::Error::from)
            .and_then(|_| port.write_all(bytes))
            .and_then(|_| port.flush());
        result.map_err(|e| self.write_error(e))
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        let port = self.port_mut()?;
        let result = port.clear(ClearBuffer::Input);
        result.map_err(|e| self.read_error(e))
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
        self.port.is_some()
    }
}

/// Source of ports and transports
///
/// The system implementation enumerates real serial ports; tests and the
/// simulator substitute virtual ones.
pub trait PortProvider {
    /// List the ports worth probing
    fn enumerate(&self) -> Result<Vec<SerialPortInfo>, DetectError>;

    /// Open a transport on a port at a baud rate
    fn connect(&self, port: &str, baud: BaudRate) -> Result<Box<dyn Transport>, TransportError>;
}

/// Real serial ports of this machine
#[derive(Default)]
pub struct SystemPorts {
    scanner: PortScanner,
}

impl SystemPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a scanner with custom skip patterns
    pub fn with_scanner(scanner: PortScanner) -> Self {
        Self { scanner }
    }
}

impl PortProvider for SystemPorts {
    fn enumerate(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        self.scanner.enumerate_ports()
    }

    fn connect(&self, port: &str, baud: BaudRate) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SerialTransport::connect(port, baud)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Transport replaying scripted reads and recording writes
    struct ScriptedTransport {
        reads: VecDeque<Vec<u8>>,
        written: Vec<Vec<u8>>,
        open: bool,
    }

    impl ScriptedTransport {
        fn new(reads: &[&[u8]]) -> Self {
            Self {
                reads: reads.iter().map(|r| r.to_vec()).collect(),
                written: Vec::new(),
                open: true,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn open(&mut self) -> Result<(), TransportError> {
            self.open = true;
            Ok(())
        }
        fn close(&mut self) {
            self.open = false;
        }
        fn read(&mut self, max: usize, _: Duration) -> Result<Vec<u8>, TransportError> {
            let mut chunk = self.reads.pop_front().unwrap_or_default();
            chunk.truncate(max);
            Ok(chunk)
        }
        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.written.push(bytes.to_vec());
            Ok(())
        }
        fn clear_input(&mut self) -> Result<(), TransportError> {
            self.reads.clear();
            Ok(())
        }
        fn set_baud_rate(&mut self, _: BaudRate) {}
        fn baud_rate(&self) -> BaudRate {
            BaudRate::B115200
        }
        fn port_name(&self) -> &str {
            "scripted"
        }
        fn is_open(&self) -> bool {
            self.open
        }
    }

    #[test]
    fn test_exchange_collects_split_reply() {
        let mut t = ScriptedTransport::new(&[b"", b"_f", b"5\x14"]);
        let reply = exchange(&mut t, b"_f5", 4, &QueryOptions::default()).unwrap();
        assert_eq!(reply, b"_f5\x14");
        assert_eq!(t.written, vec![b"_f5".to_vec()]);
    }

    #[test]
    fn test_exchange_drops_excess_bytes() {
        let mut t = ScriptedTransport::new(&[b"2xyz"]);
        let reply = exchange(&mut t, b"_d2", 1, &QueryOptions::default()).unwrap();
        assert_eq!(reply, b"2");
    }

    #[test]
    fn test_exchange_ignores_zeros_when_asked() {
        let mut t = ScriptedTransport::new(&[&[0, 0, b'_', b'x'], &[0, b'i', b'd', 0, b'0']]);
        let options = QueryOptions {
            ignore_zeros: true,
            ..Default::default()
        };
        let reply = exchange(&mut t, b"_c1", 5, &options).unwrap();
        assert_eq!(reply, b"_xid0");
    }

    #[test]
    fn test_exchange_gives_up_after_attempts() {
        let mut t = ScriptedTransport::new(&[]);
        let options = QueryOptions {
            attempts: 3,
            ..Default::default()
        };
        let reply = exchange(&mut t, b"_d4", 1, &options).unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn test_paced_write_is_byte_by_byte() {
        let mut t = ScriptedTransport::new(&[]);
        t.write_paced(b"ah\x01", Duration::ZERO).unwrap();
        assert_eq!(t.written, vec![b"a".to_vec(), b"h".to_vec(), vec![0x01]]);
    }

    #[test]
    fn test_exchange_until_quiet() {
        let mut t = ScriptedTransport::new(&[b"", b"RB-8", b"40\r", b"", b"", b""]);
        let reply = exchange_until_quiet(&mut t, b"_d1", 100, &QueryOptions::default()).unwrap();
        assert_eq!(reply, b"RB-840\r");
    }

    #[test]
    fn test_closed_serial_transport_reports_not_open() {
        let mut t = SerialTransport::new("/dev/does-not-exist", BaudRate::B115200);
        assert!(!t.is_open());
        assert_eq!(
            t.write(b"e1"),
            Err(TransportError::NotOpen("/dev/does-not-exist".to_string()))
        );
        assert!(matches!(
            t.read(1, Duration::ZERO),
            Err(TransportError::NotOpen(_))
        ));
        // Closing twice is harmless
        t.close();
        t.close();
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// However the reply is split across reads, it is reassembled in order
            #[test]
            fn split_reply_is_reassembled(
                reply in prop::collection::vec(1u8..=255, 1..32),
                cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
            ) {
                let mut points: Vec<usize> = cuts.iter().map(|c| c.index(reply.len())).collect();
                points.sort_unstable();
                points.dedup();

                let mut chunks = Vec::new();
                let mut start = 0;
                for p in points.into_iter().chain(std::iter::once(reply.len())) {
                    chunks.push(reply[start..p].to_vec());
                    start = p;
                }
                let reads: Vec<&[u8]> = chunks.iter().map(|c| c.as_slice()).collect();

                let mut t = ScriptedTransport::new(&reads);
                let got = exchange(&mut t, b"_xx", reply.len(), &QueryOptions::default()).unwrap();
                prop_assert_eq!(got, reply);
            }
        }
    }
}
