//! # StationKit
//!
//! Serial link to a GRBL-style CNC/laser station:
//! - Finds the port the station is attached to and remembers it
//! - Opens the link with bounded reconnect and rediscovery
//! - Sends commands and reads line responses
//! - Homes the machine and runs absolute moves
//!
//! ## Architecture
//!
//! StationKit is organized as a workspace with multiple crates:
//!
//! 1. **stationkit-core** - Port records, positions, motion requests, errors
//! 2. **stationkit-settings** - Configuration files and the port registry
//! 3. **stationkit-communication** - Serial backend, discovery, link, GRBL protocol
//! 4. **stationkit** - Logging setup and the command line tool

pub use stationkit_communication::{
    known_device_label, DeviceLink, DiscoveryQuery, LineBuffer, LinkSession, MotionProtocol,
    PortClassifier, PortDiscoverer, SerialBackend, SerialHandle, StatusParser, SystemSerial,
};

pub use stationkit_core::{
    ConnectionError, ConnectionState, ControllerError, DiscoveryError, Error, MachinePosition,
    MotionRequest, PortDescriptor, RawPortInfo, Result, RetryBudget, DEFAULT_FEED_RATE,
};

pub use stationkit_settings::{
    Config, DiscoverySettings, LinkSettings, PortRegistry, RegistryError, SettingsError,
};

use std::path::Path;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
///
/// Fails if a global subscriber is already installed.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Initialize logging to a file, appending to it
pub fn init_logging_to(path: &Path) -> anyhow::Result<()> {
    use std::fs::OpenOptions;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let fmt_layer = fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
