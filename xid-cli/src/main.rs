//! xidctl - Cedrus XID device tool
//!
//! Finds XID response pads, StimTrackers and light sensors on the serial
//! ports of this machine and drives them: list what is attached, stream
//! key events, raise and pulse output lines.
//!
//! `--simulate` swaps the serial ports for virtual devices.

mod output;
mod settings;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xid_detect::{PortProvider, PortScanner, ScannerConfig, SystemPorts};
use xid_device::{DeviceHandle, DeviceScanner};
use xid_protocol::ConfigTable;
use xid_sim::{SharedDevice, SimPorts, VirtualXidDevice};

use crate::output::DeviceSummary;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "xidctl")]
#[command(about = "Discover and drive Cedrus XID devices")]
#[command(version)]
struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use virtual devices instead of serial ports
    #[arg(long, global = true)]
    simulate: bool,

    /// JSON device table to use instead of the built-in one
    #[arg(long, global = true)]
    table: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached XID devices
    Scan,

    /// Show details of attached devices
    Info {
        /// Only the device on this port
        #[arg(long)]
        port: Option<String>,
    },

    /// Print key events until Ctrl-C
    Listen {
        /// Only the device on this port
        #[arg(long)]
        port: Option<String>,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Raise or lower output lines
    Lines {
        /// Line mask, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_mask)]
        mask: u16,
        /// Lower the lines instead of raising them
        #[arg(long)]
        lower: bool,
        /// Keep lines outside the mask as they are
        #[arg(long)]
        leave: bool,
        #[arg(long)]
        port: Option<String>,
    },

    /// Raise lines for a fixed time
    Pulse {
        #[arg(value_parser = parse_mask)]
        mask: u16,
        /// Pulse length in milliseconds
        #[arg(long, default_value_t = 100)]
        duration: u32,
        #[arg(long)]
        port: Option<String>,
    },

    /// Toggle lines on and off
    Flash {
        #[arg(value_parser = parse_mask)]
        mask: u16,
        /// Number of on/off cycles
        #[arg(long, default_value_t = 3)]
        count: u32,
        /// Half period in milliseconds (default from settings)
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        port: Option<String>,
    },

    /// Load and run a pulse table
    Sequence {
        /// Entries as `offset_ms:mask`, e.g. `0:0x1 100:0x0`
        #[arg(required = true, value_parser = parse_entry)]
        entries: Vec<(u32, u16)>,
        #[arg(long)]
        port: Option<String>,
    },

    /// List the entries of the device table
    Table,

    /// Print the settings file, or write the defaults to it
    Settings {
        #[arg(long)]
        reset: bool,
    },
}

/// Parse a line mask written as decimal or `0x` hex
fn parse_mask(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid line mask '{}': {}", s, e))
}

/// Parse a pulse table entry written as `offset_ms:mask`
fn parse_entry(s: &str) -> Result<(u32, u16), String> {
    let (offset, mask) = s
        .split_once(':')
        .ok_or_else(|| format!("expected offset_ms:mask, got '{}'", s))?;
    let offset = offset
        .parse()
        .map_err(|e| format!("invalid offset '{}': {}", offset, e))?;
    Ok((offset, parse_mask(mask)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "xidctl={0},xid_protocol={0},xid_detect={0},xid_device={0},xid_sim={0}",
                    log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = Settings::load();

    if let Commands::Settings { reset } = cli.command {
        return show_settings(&settings, reset);
    }

    let table = load_table(&cli, &settings)?;
    if let Commands::Table = cli.command {
        output::print_table(table.iter());
        return Ok(());
    }

    if cli.simulate {
        let mut ports = SimPorts::new();
        let devices: Vec<SharedDevice> = settings
            .simulated_devices
            .iter()
            .enumerate()
            .map(|(i, config)| {
                ports.add(
                    format!("SIM{}", i),
                    VirtualXidDevice::from_config(config.clone()),
                )
            })
            .collect();

        let mut scanner = DeviceScanner::with_table(ports, table);
        let handles = discover(&mut scanner)?;
        if matches!(cli.command, Commands::Listen { .. }) {
            script_key_presses(&devices);
        }
        run(&cli, &settings, &mut scanner, handles).await
    } else {
        let ports = SystemPorts::with_scanner(PortScanner::with_config(ScannerConfig {
            skip_patterns: settings.skip_patterns.clone(),
        }));
        let mut scanner = DeviceScanner::with_table(ports, table);
        let handles = discover(&mut scanner)?;
        let result = run(&cli, &settings, &mut scanner, handles).await;
        scanner.drop_all();
        result
    }
}

fn show_settings(settings: &Settings, reset: bool) -> Result<()> {
    if reset {
        let path = Settings::default().save().map_err(anyhow::Error::msg)?;
        println!("Wrote defaults to {}", path.display());
        return Ok(());
    }
    if let Some(path) = Settings::settings_path() {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn load_table(cli: &Cli, settings: &Settings) -> Result<ConfigTable> {
    match cli.table.as_ref().or(settings.device_table.as_ref()) {
        Some(path) => ConfigTable::load(path)
            .with_context(|| format!("Failed to load device table {}", path.display())),
        None => Ok(ConfigTable::builtin()),
    }
}

/// Run a scan, reporting devices that had to be switched into XID mode
fn discover<P: PortProvider>(scanner: &mut DeviceScanner<P>) -> Result<Vec<DeviceHandle>> {
    let handles = scanner
        .detect_with(
            &mut |name| warn!("{} was not in XID mode and has been switched", name),
            &mut |percent| {
                debug!("Scan {}%", percent);
                false
            },
        )
        .context("Device scan failed")?;
    info!("{} device(s) found", handles.len());
    Ok(handles)
}

/// Queue a few key presses on the virtual devices so `listen` has something to show
fn script_key_presses(devices: &[SharedDevice]) {
    for device in devices {
        let mut device = device.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for key in 0..3 {
            device.press_key(0, key);
            device.release_key(0, key);
        }
    }
}

/// Handles the command applies to
fn targets<P: PortProvider>(
    scanner: &DeviceScanner<P>,
    handles: Vec<DeviceHandle>,
    port: Option<&str>,
) -> Result<Vec<DeviceHandle>> {
    match port {
        Some(port) => match scanner.find_by_port(port) {
            Some(handle) => Ok(vec![handle]),
            None => bail!("No XID device on {}", port),
        },
        None if handles.is_empty() => bail!("No XID devices found"),
        None => Ok(handles),
    }
}

async fn run<P: PortProvider>(
    cli: &Cli,
    settings: &Settings,
    scanner: &mut DeviceScanner<P>,
    handles: Vec<DeviceHandle>,
) -> Result<()> {
    match &cli.command {
        Commands::Scan => {
            let summaries: Vec<_> = handles
                .iter()
                .filter_map(|&h| scanner.get(h).map(|c| DeviceSummary::new(h, c)))
                .collect();
            output::print_devices(&summaries, cli.json)
        }
        Commands::Info { port } => {
            for handle in targets(scanner, handles, port.as_deref())? {
                let Some(connection) = scanner.get_mut(handle) else {
                    continue;
                };
                output::print_devices(&[DeviceSummary::new(handle, connection)], cli.json)?;
                if cli.json {
                    continue;
                }
                match connection.get_internal_product_name() {
                    Ok(name) => println!("     internal name: {}", name),
                    Err(e) => debug!("{}: no internal name: {}", handle, e),
                }
                if let Ok(ms) = connection.get_pulse_duration() {
                    println!("     pulse duration: {} ms", ms);
                }
                if let Some(format) = connection.packet_format() {
                    println!("     response packets: {:?}", format);
                }
            }
            Ok(())
        }
        Commands::Listen { port, seconds } => {
            let targets = targets(scanner, handles, port.as_deref())?;
            listen(scanner, &targets, settings.poll_interval_ms, *seconds, cli.json).await
        }
        Commands::Lines {
            mask,
            lower,
            leave,
            port,
        } => {
            for handle in targets(scanner, handles, port.as_deref())? {
                let Some(connection) = scanner.get_mut(handle) else {
                    continue;
                };
                if *lower {
                    connection.lower_lines(*mask, *leave)?;
                } else {
                    connection.raise_lines(*mask, *leave)?;
                }
                println!("{} lines now 0x{:04X}", handle, connection.lines_state());
            }
            Ok(())
        }
        Commands::Pulse {
            mask,
            duration,
            port,
        } => {
            for handle in targets(scanner, handles, port.as_deref())? {
                let Some(connection) = scanner.get_mut(handle) else {
                    continue;
                };
                connection
                    .set_pulse_duration(*duration)
                    .with_context(|| format!("{} cannot pulse", connection.name()))?;
                connection.raise_lines(*mask, false)?;
            }
            Ok(())
        }
        Commands::Flash {
            mask,
            count,
            interval,
            port,
        } => {
            let targets = targets(scanner, handles, port.as_deref())?;
            let half_period = Duration::from_millis(interval.unwrap_or(settings.flash_interval_ms));
            for _ in 0..*count {
                for &handle in &targets {
                    if let Some(connection) = scanner.get_mut(handle) {
                        connection.raise_lines(*mask, false)?;
                    }
                }
                tokio::time::sleep(half_period).await;
                for &handle in &targets {
                    if let Some(connection) = scanner.get_mut(handle) {
                        connection.clear_lines()?;
                    }
                }
                tokio::time::sleep(half_period).await;
            }
            Ok(())
        }
        Commands::Sequence { entries, port } => {
            for handle in targets(scanner, handles, port.as_deref())? {
                let Some(connection) = scanner.get_mut(handle) else {
                    continue;
                };
                connection.clear_pulse_table()?;
                for &(offset_ms, lines) in entries {
                    connection.add_pulse_table_entry(offset_ms, lines)?;
                }
                connection.run_pulse_table()?;
                println!("{} running {} pulse table entries", handle, entries.len());
            }
            Ok(())
        }
        Commands::Table | Commands::Settings { .. } => Ok(()),
    }
}

/// Poll devices on a fixed interval and print every response
async fn listen<P: PortProvider>(
    scanner: &mut DeviceScanner<P>,
    targets: &[DeviceHandle],
    poll_interval_ms: u64,
    seconds: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_millis(poll_interval_ms.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let deadline = seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Listening on {} device(s)", targets.len());
    for &handle in targets {
        if let Some(connection) = scanner.get_mut(handle) {
            connection.reset_rt_timer()?;
        }
    }

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = interval.tick() => {}
        }

        let mut alive = 0;
        for &handle in targets {
            let Some(connection) = scanner.get_mut(handle) else {
                continue;
            };
            if connection.has_lost_connection() {
                continue;
            }
            alive += 1;
            if let Err(e) = connection.poll_for_response() {
                warn!("{}: {}", handle, e);
                continue;
            }
            while let Some(response) = connection.get_next_response() {
                output::print_response(handle, &response, json)?;
            }
        }

        if alive == 0 {
            bail!("Every device has been disconnected");
        }
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_parse_mask() {
        assert_eq!(parse_mask("0x00FF"), Ok(0xFF));
        assert_eq!(parse_mask("12"), Ok(12));
        assert!(parse_mask("0x1FFFF").is_err());
        assert!(parse_mask("lines").is_err());
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("100:0x3"), Ok((100, 3)));
        assert!(parse_entry("100").is_err());
        assert!(parse_entry("x:1").is_err());
    }

    #[test]
    fn test_parse_sequence_command() -> TestResult {
        let cli = Cli::try_parse_from(["xidctl", "sequence", "0:0x1", "50:0"])?;
        match cli.command {
            Commands::Sequence { entries, port } => {
                assert_eq!(entries, vec![(0, 1), (50, 0)]);
                assert!(port.is_none());
            }
            _ => panic!("expected sequence"),
        }
        Ok(())
    }

    #[test]
    fn test_parse_lines_command() -> TestResult {
        let cli = Cli::try_parse_from(["xidctl", "--simulate", "lines", "0x3", "--lower", "--leave"])?;
        assert!(cli.simulate);
        assert!(matches!(
            cli.command,
            Commands::Lines {
                mask: 3,
                lower: true,
                leave: true,
                port: None
            }
        ));
        Ok(())
    }

    #[test]
    fn test_parse_listen_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["xidctl", "listen", "-vv"])?;
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Listen {
                port: None,
                seconds: None
            }
        ));
        Ok(())
    }

    #[test]
    fn test_targets_by_port() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", VirtualXidDevice::new("RB-840", b'2', b'3', 2));
        let mut scanner = DeviceScanner::new(ports);
        let handles = discover(&mut scanner).unwrap();

        assert_eq!(targets(&scanner, handles.clone(), Some("SIM0")).unwrap(), handles);
        assert!(targets(&scanner, handles, Some("SIM9")).is_err());
        assert!(targets(&scanner, Vec::new(), None).is_err());
    }

    #[tokio::test]
    async fn test_listen_stops_at_deadline() {
        let mut ports = SimPorts::new();
        ports.add("SIM0", VirtualXidDevice::new("RB-840", b'2', b'3', 2));
        let mut scanner = DeviceScanner::new(ports);
        let handles = discover(&mut scanner).unwrap();

        listen(&mut scanner, &handles, 5, Some(0), false).await.unwrap();
    }
}
