//! XID device identification
//!
//! A port is probed by opening it at each candidate baud rate and asking
//! for the protocol mode (`_c1`). Anything answering `_xid<n>` is an XID
//! device; it is forced into XID mode if needed and then asked for its
//! identity triple (`_d4`, `_d2`, `_d3`) and minor firmware version.
//!
//! Every identification query discards zero bytes: a device left in
//! E-Prime/PST mode keeps streaming zeros until it is switched over.

use std::time::Duration;

use tracing::{debug, info, trace};
use xid_protocol::{reply, BaudRate, EncodeCommand, XidCommand};

use crate::error::DetectError;
use crate::transport::{exchange, PortProvider, QueryOptions, Transport};

/// Configuration for probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout of each read attempt
    pub read_timeout: Duration,
    /// Read attempts per identification query
    pub query_attempts: u32,
    /// Baud rates to try, in order
    pub baud_order: Vec<BaudRate>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1),
            query_attempts: 100,
            baud_order: BaudRate::SCAN_ORDER.to_vec(),
        }
    }
}

/// What a device said about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Port the device answered on
    pub port: String,
    /// Baud rate it answered at
    pub baud: BaudRate,
    /// Protocol mode reported before any change (0 = XID)
    pub protocol_mode: u8,
    /// Whether the device had to be switched into XID mode
    pub mode_forced: bool,
    pub product_id: u8,
    pub model_id: u8,
    pub major_version: u8,
    pub minor_version: u8,
}

impl Identification {
    /// Identity triple (product, model, major)
    pub fn identity(&self) -> (u8, u8, u8) {
        (self.product_id, self.model_id, self.major_version)
    }
}

/// An identified device and the open transport it answered on
pub struct ProbeResult {
    pub transport: Box<dyn Transport>,
    pub identification: Identification,
}

impl std::fmt::Debug for ProbeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeResult")
            .field("port", &self.transport.port_name())
            .field("identification", &self.identification)
            .finish()
    }
}

/// XID device prober
pub struct XidProber {
    config: ProbeConfig,
}

impl XidProber {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self {
            config: ProbeConfig::default(),
        }
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    fn pst_proof(&self) -> QueryOptions {
        QueryOptions {
            read_timeout: self.config.read_timeout,
            attempts: self.config.query_attempts,
            ignore_zeros: true,
            write_gap: None,
        }
    }

    fn query(&self, transport: &mut dyn Transport, command: XidCommand) -> Result<Vec<u8>, DetectError> {
        transport.clear_input()?;
        Ok(exchange(
            transport,
            &command.encode(),
            command.reply_len(),
            &self.pst_proof(),
        )?)
    }

    /// Identify the device on an open transport at its current baud rate
    pub fn identify(&self, transport: &mut dyn Transport) -> Result<Identification, DetectError> {
        let port = transport.port_name().to_string();
        let baud = transport.baud_rate();

        let protocol = self.query(transport, XidCommand::GetProtocol)?;
        if protocol.is_empty() {
            trace!("{}: silent at {} baud", port, baud);
            return Err(DetectError::NoReply {
                port,
                baud: baud.bits_per_second(),
            });
        }
        let protocol_mode =
            reply::parse_protocol_mode(&protocol).map_err(|_| DetectError::NotXid {
                port: port.clone(),
                reply: String::from_utf8_lossy(&protocol).into_owned(),
            })?;

        let mode_forced = protocol_mode != 0;
        if mode_forced {
            info!("{}: device in protocol mode {}, switching to XID", port, protocol_mode);
            transport.write(&XidCommand::SetProtocol { protocol: 0 }.encode())?;
        }

        let major_version = reply::parse_major_version(&self.query(transport, XidCommand::GetMajorVersion)?)?;
        let product_id = reply::parse_product_id(&self.query(transport, XidCommand::GetProductId)?)?;
        let model_id = reply::parse_model_id(&self.query(transport, XidCommand::GetModelId)?)?;
        let minor_version = match reply::parse_minor_version(&self.query(transport, XidCommand::GetMinorVersion)?) {
            Ok(minor) => minor,
            Err(e) => {
                debug!("{}: no usable minor version ({}), assuming 0", port, e);
                0
            }
        };

        debug!(
            "{}: product '{}', model '{}', firmware {}.{} at {} baud",
            port, product_id as char, model_id as char, major_version, minor_version, baud
        );

        Ok(Identification {
            port,
            baud,
            protocol_mode,
            mode_forced,
            product_id,
            model_id,
            major_version,
            minor_version,
        })
    }

    /// Probe a port at every configured baud rate
    pub fn probe_port<P>(&self, provider: &P, port: &str) -> Result<ProbeResult, DetectError>
    where
        P: PortProvider + ?Sized,
    {
        self.probe_port_with(provider, port, &mut |_| false)
    }

    /// Probe a port, calling `before_attempt` ahead of each baud rate
    ///
    /// The scan stops with [`DetectError::Cancelled`] as soon as the
    /// callback returns true. A port that answers as an XID device but
    /// gives an unusable identity is not retried at other rates.
    pub fn probe_port_with<P>(
        &self,
        provider: &P,
        port: &str,
        before_attempt: &mut dyn FnMut(BaudRate) -> bool,
    ) -> Result<ProbeResult, DetectError>
    where
        P: PortProvider + ?Sized,
    {
        let mut last_error = None;

        for &baud in &self.config.baud_order {
            if before_attempt(baud) {
                return Err(DetectError::Cancelled);
            }

            debug!("Probing {} at {} baud", port, baud);
            let mut transport = match provider.connect(port, baud) {
                Ok(t) => t,
                Err(e) => {
                    debug!("{}", e);
                    last_error = Some(DetectError::Transport(e));
                    continue;
                }
            };

            match self.identify(transport.as_mut()) {
                Ok(identification) => {
                    return Ok(ProbeResult {
                        transport,
                        identification,
                    })
                }
                Err(e @ DetectError::Parse(_)) => {
                    transport.close();
                    return Err(e);
                }
                Err(e) => {
                    trace!("{}", e);
                    transport.close();
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DetectError::NoReply {
            port: port.to_string(),
            baud: 0,
        }))
    }
}

impl Default for XidProber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::collections::VecDeque;

    /// Minimal firmware: answers identification queries from a table
    struct FakeDevice {
        baud: BaudRate,
        answers_at: BaudRate,
        protocol: u8,
        identity: [u8; 4],
        pending: VecDeque<u8>,
        written: Vec<Vec<u8>>,
        zero_spew: bool,
    }

    impl FakeDevice {
        fn new(answers_at: BaudRate, identity: [u8; 4]) -> Self {
            Self {
                baud: answers_at,
                answers_at,
                protocol: 0,
                identity,
                pending: VecDeque::new(),
                written: Vec::new(),
                zero_spew: false,
            }
        }
    }

    impl Transport for FakeDevice {
        fn open(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        fn close(&mut self) {}
        fn read(&mut self, max: usize, _: Duration) -> Result<Vec<u8>, TransportError> {
            let mut out = Vec::new();
            if self.zero_spew {
                out.extend([0, 0, 0]);
            }
            while out.len() < max {
                match self.pending.pop_front() {
                    Some(b) => out.push(b),
                    None => break,
                }
            }
            Ok(out)
        }
        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.written.push(bytes.to_vec());
            if self.baud != self.answers_at {
                return Ok(());
            }
            let [product, model, major, minor] = self.identity;
            match bytes {
                b"_c1" => self
                    .pending
                    .extend([b'_', b'x', b'i', b'd', b'0' + self.protocol]),
                b"_d2" => self.pending.push_back(product),
                b"_d3" => self.pending.push_back(model),
                b"_d4" => self.pending.push_back(major),
                b"_d5" => self.pending.push_back(minor),
                [b'c', b'1', p] => {
                    self.protocol = p - b'0';
                    self.zero_spew = false;
                }
                _ => {}
            }
            Ok(())
        }
        fn clear_input(&mut self) -> Result<(), TransportError> {
            self.pending.clear();
            Ok(())
        }
        fn set_baud_rate(&mut self, baud: BaudRate) {
            self.baud = baud;
        }
        fn baud_rate(&self) -> BaudRate {
            self.baud
        }
        fn port_name(&self) -> &str {
            "fake"
        }
        fn is_open(&self) -> bool {
            true
        }
    }

    fn fast_prober() -> XidProber {
        XidProber::with_config(ProbeConfig {
            read_timeout: Duration::ZERO,
            query_attempts: 4,
            ..Default::default()
        })
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(1));
        assert_eq!(config.query_attempts, 100);
        assert_eq!(config.baud_order[0], BaudRate::B115200);
    }

    #[test]
    fn test_identify_rb_840() {
        let mut device = FakeDevice::new(BaudRate::B115200, [b'2', b'3', b'2', b'1']);
        let id = fast_prober().identify(&mut device).unwrap();
        assert_eq!(id.identity(), (b'2', b'3', 2));
        assert_eq!(id.minor_version, 1);
        assert!(!id.mode_forced);
        assert_eq!(id.baud, BaudRate::B115200);
    }

    #[test]
    fn test_identify_forces_xid_mode() {
        let mut device = FakeDevice::new(BaudRate::B115200, [b'0', b'A', b'2', b'0']);
        device.protocol = 2;
        device.zero_spew = true;
        let id = fast_prober().identify(&mut device).unwrap();
        assert!(id.mode_forced);
        assert_eq!(id.protocol_mode, 2);
        assert_eq!(device.protocol, 0);
        assert!(device.written.contains(&b"c10".to_vec()));
    }

    #[test]
    fn test_identify_wrong_baud_is_no_reply() {
        let mut device = FakeDevice::new(BaudRate::B19200, [b'2', b'3', b'2', b'0']);
        device.baud = BaudRate::B115200;
        assert!(matches!(
            fast_prober().identify(&mut device),
            Err(DetectError::NoReply { baud: 115200, .. })
        ));
    }

    #[test]
    fn test_identify_bad_major_is_parse_error() {
        let mut device = FakeDevice::new(BaudRate::B115200, [b'2', b'3', b'7', b'0']);
        assert!(matches!(
            fast_prober().identify(&mut device),
            Err(DetectError::Parse(_))
        ));
    }
}
