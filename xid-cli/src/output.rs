//! Human and JSON output

use serde::Serialize;
use xid_device::{DeviceConnection, DeviceHandle, KeyResponse};
use xid_protocol::DeviceConfig;

/// One registered device as printed by `scan` and `info`
#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub handle: u32,
    pub name: String,
    pub family: &'static str,
    pub port: String,
    pub baud: u32,
    pub product_id: u8,
    pub model_id: u8,
    pub firmware: String,
    pub output_lines: u8,
}

impl DeviceSummary {
    pub fn new(handle: DeviceHandle, connection: &DeviceConnection) -> Self {
        let (product_id, model_id, major) = connection.identity();
        Self {
            handle: handle.as_u32(),
            name: connection.name().to_string(),
            family: connection.config().capabilities().family(),
            port: connection.port_name().to_string(),
            baud: connection.baud_rate().bits_per_second(),
            product_id,
            model_id,
            firmware: format!("{}.{}", major, connection.minor_version()),
            output_lines: connection.config().output_lines(),
        }
    }
}

/// Printable form of an id byte: ASCII ids as characters, the rest as numbers
fn id(byte: u8) -> String {
    if byte.is_ascii_graphic() {
        format!("'{}'", byte as char)
    } else {
        byte.to_string()
    }
}

pub fn print_devices(devices: &[DeviceSummary], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No XID devices found");
        return Ok(());
    }
    for d in devices {
        println!(
            "#{:<3} {:<28} {:<14} {:<14} {:>6} baud  product {} model {} fw {}",
            d.handle,
            d.name,
            d.family,
            d.port,
            d.baud,
            id(d.product_id),
            id(d.model_id),
            d.firmware
        );
    }
    Ok(())
}

pub fn print_response(handle: DeviceHandle, response: &KeyResponse, json: bool) -> anyhow::Result<()> {
    if json {
        #[derive(Serialize)]
        struct Event<'a> {
            handle: u32,
            #[serde(flatten)]
            response: &'a KeyResponse,
        }
        println!(
            "{}",
            serde_json::to_string(&Event {
                handle: handle.as_u32(),
                response,
            })?
        );
    } else {
        let key = match response.key {
            Some(key) => key.to_string(),
            None => format!("raw {}", response.raw_key),
        };
        println!(
            "{} port {} key {:<6} {:<8} {:>8} ms",
            handle,
            response.port,
            key,
            if response.pressed { "pressed" } else { "released" },
            response.reaction_time_ms
        );
    }
    Ok(())
}

pub fn print_table<'a>(configs: impl Iterator<Item = &'a std::sync::Arc<DeviceConfig>>) {
    for config in configs {
        let (product, model, major) = config.identity();
        println!(
            "{:<32} product {:<5} model {:<5} major {}  {} output lines",
            config.name(),
            id(product),
            id(model),
            major,
            config.output_lines()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_formatting() {
        assert_eq!(id(b'S'), "'S'");
        assert_eq!(id(25), "25");
    }
}
