//! Command line entry point for StationKit
//!
//! ```bash
//! stationkit ports
//! stationkit find --prefer CH340
//! stationkit move --x 10 --feed 600
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stationkit::{
    init_logging, init_logging_to, known_device_label, Config, DeviceLink, DiscoveryQuery,
    MotionProtocol, MotionRequest, PortClassifier, PortDiscoverer, PortRegistry, SerialBackend,
    SystemSerial,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "stationkit")]
#[command(version)]
#[command(about = "Find, connect to and drive a GRBL station over serial", long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use this port instead of the cached or discovered one
    #[arg(long, global = true)]
    port: Option<String>,

    /// Append logs to this file instead of stdout
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and how discovery classifies them
    Ports,

    /// Run port discovery
    Find {
        /// USB vendor id (hex)
        #[arg(long, value_parser = parse_usb_id, requires = "pid")]
        vid: Option<u16>,

        /// USB product id (hex)
        #[arg(long, value_parser = parse_usb_id, requires = "vid")]
        pid: Option<u16>,

        /// Preferred device name (repeatable)
        #[arg(long = "prefer")]
        prefer: Vec<String>,

        /// Ignore the cached port
        #[arg(long)]
        no_cache: bool,

        /// Consider Bluetooth and other virtual ports
        #[arg(long)]
        include_virtual: bool,
    },

    /// Send one command and print one response line
    Send {
        /// Command text, sent with a trailing newline
        command: String,

        /// Read timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Run the homing cycle
    Home,

    /// Absolute move to the given coordinates
    Move {
        #[arg(long)]
        x: Option<f64>,
        #[arg(long)]
        y: Option<f64>,
        #[arg(long)]
        z: Option<f64>,

        /// Feed rate in units per minute
        #[arg(long)]
        feed: Option<f64>,
    },

    /// Print the machine position
    Position,

    /// Forget the cached port
    ClearCache,
}

fn parse_usb_id(value: &str) -> std::result::Result<u16, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB id '{}': {}", value, e))
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            let path = Config::default_path();
            Config::load_or_default(&path)
                .with_context(|| format!("failed to load config {}", path.display()))
        }
    }
}

fn open_link(config: &Config, port: Option<String>) -> Result<DeviceLink> {
    let backend: Arc<dyn SerialBackend> = Arc::new(SystemSerial::new());
    match port {
        Some(port) => {
            config.validate()?;
            let registry = Arc::new(PortRegistry::new(&config.discovery.cache_path)?);
            Ok(DeviceLink::with_port(
                backend,
                registry,
                config.link.clone(),
                DiscoveryQuery::from(&config.discovery),
                port,
            ))
        }
        None => Ok(DeviceLink::from_config(config, backend)?),
    }
}

fn list_ports() -> Result<()> {
    let ports = SystemSerial::new().available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    for port in &ports {
        let kind = if PortClassifier::is_virtual(port) {
            "virtual"
        } else {
            "physical"
        };
        let ids = match port.usb_ids() {
            Some((vid, pid)) => format!("{:04X}:{:04X}", vid, pid),
            None => "----:----".to_string(),
        };
        let label = port
            .usb_ids()
            .and_then(|(vid, pid)| known_device_label(vid, pid))
            .unwrap_or("");
        println!(
            "{:<16} {} {:<8} {:<40} {}",
            port.port_name,
            ids,
            kind,
            port.description.as_deref().unwrap_or("-"),
            label
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_file {
        Some(path) => init_logging_to(path)?,
        None => init_logging()?,
    }
    tracing::debug!("stationkit {} (built {})", stationkit::VERSION, stationkit::BUILD_DATE);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Ports => list_ports()?,

        Commands::Find {
            vid,
            pid,
            prefer,
            no_cache,
            include_virtual,
        } => {
            let mut query = DiscoveryQuery::from(&config.discovery);
            if !prefer.is_empty() {
                query = query.with_preferred(prefer);
            }
            if let Some((vid, pid)) = vid.zip(pid) {
                query = query.with_usb_ids(vid, pid);
            }
            query.use_cache = query.use_cache && !no_cache;
            query.skip_virtual = query.skip_virtual && !include_virtual;

            let registry = Arc::new(PortRegistry::new(&config.discovery.cache_path)?);
            let discoverer = PortDiscoverer::new(Arc::new(SystemSerial::new()), registry);
            println!("{}", discoverer.find(&query)?);
        }

        Commands::Send {
            command,
            timeout_ms,
        } => {
            let mut link = open_link(&config, cli.port)?;
            let timeout = timeout_ms.map(Duration::from_millis);
            let response = link.with_session(|link| {
                link.send(&command)?;
                link.read(timeout)
            })?;
            println!("{}", response.as_deref().unwrap_or("(no response)"));
        }

        Commands::Home => {
            let mut link = open_link(&config, cli.port)?;
            link.with_session(|link| MotionProtocol::new(link).home())?;
            println!("Homing complete");
        }

        Commands::Move { x, y, z, feed } => {
            let request = MotionRequest::new(x, y, z)
                .with_feed_rate(feed.unwrap_or(config.link.default_feed_rate));
            let mut link = open_link(&config, cli.port)?;
            link.with_session(|link| MotionProtocol::new(link).move_to(&request))?;
            println!("Move complete");
        }

        Commands::Position => {
            let mut link = open_link(&config, cli.port)?;
            match link.with_session(|link| MotionProtocol::new(link).current_position())? {
                Some(position) => println!("{}", position),
                None => println!("Position unavailable"),
            }
        }

        Commands::ClearCache => {
            let registry = PortRegistry::new(&config.discovery.cache_path)?;
            registry.clear()?;
            println!("Port cache cleared: {}", registry.path().display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("0x1A86"), Ok(0x1A86));
        assert_eq!(parse_usb_id("7523"), Ok(0x7523));
        assert!(parse_usb_id("xyz").is_err());
        assert!(parse_usb_id("0x10000").is_err());
    }

    #[test]
    fn test_move_arguments() {
        let cli = Cli::try_parse_from(["stationkit", "move", "--x", "10", "--feed", "600"]).unwrap();
        match cli.command {
            Commands::Move { x, y, feed, .. } => {
                assert_eq!(x, Some(10.0));
                assert_eq!(y, None);
                assert_eq!(feed, Some(600.0));
            }
            _ => panic!("expected move"),
        }
    }

    #[test]
    fn test_find_requires_both_ids() {
        assert!(Cli::try_parse_from(["stationkit", "find", "--vid", "1A86"]).is_err());
        assert!(
            Cli::try_parse_from(["stationkit", "find", "--vid", "1A86", "--pid", "7523"]).is_ok()
        );
    }
}
