//! Registry of discovered devices
//!
//! [`DeviceScanner`] owns every [`DeviceConnection`] it finds and hands out
//! [`DeviceHandle`]s for them. It is an ordinary value: create as many as
//! you like, each over its own [`PortProvider`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use xid_detect::{DetectError, PortProvider, XidProber};
use xid_protocol::{ConfigTable, DeviceConfig};

use crate::connection::DeviceConnection;
use crate::error::DeviceError;
use crate::state::DeviceHandle;

/// Discovers XID devices and owns their connections
pub struct DeviceScanner<P: PortProvider> {
    provider: P,
    table: ConfigTable,
    prober: XidProber,
    connections: HashMap<DeviceHandle, DeviceConnection>,
    order: Vec<DeviceHandle>,
    next_handle: u32,
}

impl<P: PortProvider> DeviceScanner<P> {
    /// Create a scanner using the built-in device table
    pub fn new(provider: P) -> Self {
        Self::with_table(provider, ConfigTable::builtin())
    }

    /// Create a scanner with a custom device table
    pub fn with_table(provider: P, table: ConfigTable) -> Self {
        Self {
            provider,
            table,
            prober: XidProber::new(),
            connections: HashMap::new(),
            order: Vec::new(),
            next_handle: 1,
        }
    }

    /// Replace the prober used by [`detect`](Self::detect)
    pub fn with_prober(mut self, prober: XidProber) -> Self {
        self.prober = prober;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn table(&self) -> &ConfigTable {
        &self.table
    }

    /// Scan for devices
    ///
    /// Returns the handles of every registered device, in discovery order.
    pub fn detect(&mut self) -> Result<Vec<DeviceHandle>, DeviceError> {
        self.detect_with(&mut |_| {}, &mut |_| false)
    }

    /// Scan for devices, reporting progress
    ///
    /// `report` receives the name of every device that had to be switched
    /// into XID mode. `progress` receives 0 before the first port, a
    /// percentage before each probe attempt and 100 at the end; returning
    /// true cancels the scan and drops every registered device.
    ///
    /// Ports that stay silent, answer garbage or identify as a device
    /// missing from the table are skipped. Only enumeration failure is an
    /// error.
    pub fn detect_with(
        &mut self,
        report: &mut dyn FnMut(&str),
        progress: &mut dyn FnMut(u32) -> bool,
    ) -> Result<Vec<DeviceHandle>, DeviceError> {
        self.check_and_drop_dead();
        self.open_all();

        let ports = self.provider.enumerate()?;
        let registered: HashSet<String> = self
            .connections
            .values()
            .map(|c| c.port_name().to_string())
            .collect();
        let candidates: Vec<_> = ports
            .into_iter()
            .filter(|p| !registered.contains(&p.port))
            .collect();

        info!("Scanning {} port(s) for XID devices", candidates.len());
        let steps = candidates.len() * self.prober.config().baud_order.len() + 1;
        let increment = 100 / steps as u32;
        let mut percent = 0;
        if progress(percent) {
            return Ok(self.cancel_scan());
        }

        for port in &candidates {
            let result = self.prober.probe_port_with(&self.provider, &port.port, &mut |_| {
                percent += increment;
                progress(percent)
            });

            let probe = match result {
                Ok(probe) => probe,
                Err(DetectError::Cancelled) => return Ok(self.cancel_scan()),
                Err(e) => {
                    debug!("{}: {}", port.port, e);
                    continue;
                }
            };

            let mode_forced = probe.identification.mode_forced;
            match DeviceConnection::from_probe(probe, &self.table) {
                Ok(connection) => {
                    if mode_forced {
                        report(connection.name());
                    }
                    info!("Found {} on {}", connection.name(), port.port);
                    self.insert(connection);
                }
                Err(e) => info!("{}: skipping: {}", port.port, e),
            }
        }

        progress(100);
        Ok(self.handles())
    }

    fn cancel_scan(&mut self) -> Vec<DeviceHandle> {
        info!("Scan cancelled, dropping all devices");
        self.drop_all();
        Vec::new()
    }

    fn insert(&mut self, connection: DeviceConnection) -> DeviceHandle {
        let handle = DeviceHandle(self.next_handle);
        self.next_handle += 1;
        self.connections.insert(handle, connection);
        self.order.push(handle);
        handle
    }

    /// Register a connection made outside of [`detect`](Self::detect)
    pub fn register(&mut self, connection: DeviceConnection) -> DeviceHandle {
        self.insert(connection)
    }

    /// Reopen every device, drop the ones that are gone, close the rest
    ///
    /// A device is gone when it cannot be reopened, loses its connection,
    /// or no longer reports the identity it was registered with. Raw
    /// connections have no identity to check. Returns the number of
    /// devices dropped.
    pub fn check_and_drop_dead(&mut self) -> usize {
        self.close_all();

        let mut dead = Vec::new();
        for &handle in &self.order {
            let Some(connection) = self.connections.get_mut(&handle) else {
                continue;
            };
            let alive = match connection.open() {
                Ok(()) if connection.is_raw() => true,
                Ok(()) => matches!(connection.verify_identity(), Ok(true)),
                Err(_) => false,
            };
            if !alive || connection.has_lost_connection() {
                warn!("{} on {} is gone", connection.name(), connection.port_name());
                dead.push(handle);
            }
        }

        for &handle in &dead {
            self.drop(handle);
        }
        self.close_all();
        dead.len()
    }

    /// Close every connection
    pub fn close_all(&mut self) {
        for connection in self.connections.values_mut() {
            connection.close();
        }
    }

    /// Open every connection; returns how many opened
    pub fn open_all(&mut self) -> usize {
        let mut opened = 0;
        for &handle in &self.order {
            let Some(connection) = self.connections.get_mut(&handle) else {
                continue;
            };
            match connection.open() {
                Ok(()) => opened += 1,
                Err(e) => warn!("Failed to open {}: {}", connection.port_name(), e),
            }
        }
        opened
    }

    /// Close and forget one device
    pub fn drop(&mut self, handle: DeviceHandle) -> Option<DeviceConnection> {
        let mut connection = self.connections.remove(&handle)?;
        self.order.retain(|&h| h != handle);
        connection.close();
        Some(connection)
    }

    /// Close and forget every device
    pub fn drop_all(&mut self) {
        self.close_all();
        self.connections.clear();
        self.order.clear();
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&DeviceConnection> {
        self.connections.get(&handle)
    }

    pub fn get_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceConnection> {
        self.connections.get_mut(&handle)
    }

    /// Handle of the device on a port
    pub fn find_by_port(&self, port: &str) -> Option<DeviceHandle> {
        self.order
            .iter()
            .copied()
            .find(|h| self.connections.get(h).is_some_and(|c| c.port_name() == port))
    }

    /// Handles in discovery order
    pub fn handles(&self) -> Vec<DeviceHandle> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Every connection, in no particular order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (DeviceHandle, &mut DeviceConnection)> {
        self.connections.iter_mut().map(|(&h, c)| (h, c))
    }

    /// Configs of the registered devices, in discovery order
    pub fn device_configs(&self) -> Vec<Arc<DeviceConfig>> {
        self.order
            .iter()
            .filter_map(|h| self.connections.get(h))
            .map(|c| Arc::clone(c.config()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xid_protocol::DevicePort;
    use xid_sim::{SimPorts, VirtualDeviceConfig, VirtualXidDevice};

    fn rb840() -> VirtualXidDevice {
        VirtualXidDevice::new("RB-840", b'2', b'3', 2)
    }

    #[test]
    fn test_no_ports() {
        let mut scanner = DeviceScanner::new(SimPorts::new());
        assert!(scanner.detect().unwrap().is_empty());
        assert!(scanner.is_empty());
    }

    #[test]
    fn test_enumeration_failure() {
        let mut ports = SimPorts::new();
        ports.set_fail_enumeration(true);
        let mut scanner = DeviceScanner::new(ports);
        assert!(matches!(
            scanner.detect(),
            Err(DeviceError::Detect(DetectError::EnumerationFailed(_)))
        ));
    }

    #[test]
    fn test_custom_table_entry() {
        let table = ConfigTable::from_configs(vec![DeviceConfig::new(
            "Custom Pad",
            25,
            1,
            2,
            8,
            vec![DevicePort::new("Keys", 0, 8)],
        )])
        .unwrap();
        let mut ports = SimPorts::new();
        ports.add("SIM0", VirtualXidDevice::new("Custom", 25, 1, 2));

        let mut scanner = DeviceScanner::with_table(ports, table);
        let handles = scanner.detect().unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(scanner.get(handles[0]).unwrap().name(), "Custom Pad");
    }

    #[test]
    fn test_unknown_and_silent_ports_skipped() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", VirtualXidDevice::new("Mystery", b'2', b'9', 2));
        let silent = ports.add("SIM1", rb840());
        silent.lock().unwrap().set_unplugged(true);
        ports.add("SIM2", rb840());

        let mut scanner = DeviceScanner::new(ports);
        let handles = scanner.detect().unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(scanner.get(handles[0]).unwrap().port_name(), "SIM2");
    }

    #[test]
    fn test_device_at_other_baud() {
        let mut ports = SimPorts::new();
        ports.add(
            "SIM0",
            VirtualXidDevice::from_config(VirtualDeviceConfig {
                baud: xid_protocol::BaudRate::B38400,
                ..Default::default()
            }),
        );
        let mut scanner = DeviceScanner::new(ports);
        let handles = scanner.detect().unwrap();
        let connection = scanner.get(handles[0]).unwrap();
        assert_eq!(connection.baud_rate(), xid_protocol::BaudRate::B38400);
    }

    #[test]
    fn test_second_detect_keeps_handles() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", rb840());
        let mut scanner = DeviceScanner::new(ports);

        let first = scanner.detect().unwrap();
        let second = scanner.detect().unwrap();
        assert_eq!(first, second);
        assert_eq!(scanner.len(), 1);
    }

    #[test]
    fn test_forced_mode_is_reported() {
        let mut ports = SimPorts::new();
        ports.add(
            "SIM0",
            VirtualXidDevice::from_config(VirtualDeviceConfig {
                protocol_mode: 2,
                ..Default::default()
            }),
        );
        let mut scanner = DeviceScanner::new(ports);

        let mut reported = Vec::new();
        let mut seen = Vec::new();
        scanner
            .detect_with(&mut |name| reported.push(name.to_string()), &mut |p| {
                seen.push(p);
                false
            })
            .unwrap();
        assert_eq!(reported, vec!["RB-840".to_string()]);
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cancel_drops_registry() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", rb840());
        let mut scanner = DeviceScanner::new(ports);
        scanner.detect().unwrap();

        scanner.provider_mut().add("SIM1", rb840());
        let handles = scanner.detect_with(&mut |_| {}, &mut |_| true).unwrap();
        assert!(handles.is_empty());
        assert!(scanner.is_empty());
    }

    #[test]
    fn test_cancel_before_first_port() {
        let mut ports = SimPorts::new();
        let device = ports.add("SIM0", rb840());
        let mut scanner = DeviceScanner::new(ports);

        let mut seen = Vec::new();
        let handles = scanner
            .detect_with(&mut |_| {}, &mut |p| {
                seen.push(p);
                true
            })
            .unwrap();
        assert!(handles.is_empty());
        assert_eq!(seen, vec![0]);
        assert!(device.lock().unwrap().commands().is_empty());
    }

    #[test]
    fn test_raw_connection_survives_rescan() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", VirtualXidDevice::new("Mystery", b'2', b'9', 2));
        let transport = ports.connect("SIM0", xid_protocol::BaudRate::B115200).unwrap();
        let mut scanner = DeviceScanner::new(ports);
        let handle = scanner.register(DeviceConnection::raw(transport));

        assert_eq!(scanner.check_and_drop_dead(), 0);
        assert_eq!(scanner.detect().unwrap(), vec![handle]);
        assert!(scanner.get(handle).unwrap().is_raw());
    }

    #[test]
    fn test_check_and_drop_dead() {
        let mut ports = SimPorts::new();
        let gone = ports.add("SIM0", rb840());
        ports.add("SIM1", rb840());
        let mut scanner = DeviceScanner::new(ports);
        scanner.detect().unwrap();
        assert_eq!(scanner.len(), 2);

        gone.lock().unwrap().set_unplugged(true);
        assert_eq!(scanner.check_and_drop_dead(), 1);
        assert_eq!(scanner.len(), 1);
        assert!(scanner.find_by_port("SIM0").is_none());

        // Survivors are left closed
        let handle = scanner.find_by_port("SIM1").unwrap();
        assert!(!scanner.get(handle).unwrap().is_open());
    }

    #[test]
    fn test_drop_one() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", rb840());
        ports.add("SIM1", rb840());
        let mut scanner = DeviceScanner::new(ports);
        let handles = scanner.detect().unwrap();

        let dropped = scanner.drop(handles[0]).unwrap();
        assert!(!dropped.is_open());
        assert!(scanner.drop(handles[0]).is_none());
        assert_eq!(scanner.handles(), vec![handles[1]]);
        assert_eq!(scanner.device_configs().len(), 1);
    }
}
