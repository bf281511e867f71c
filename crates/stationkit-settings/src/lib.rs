//! StationKit Settings Crate
//!
//! Handles link/discovery configuration and the persisted cache of the last
//! known station port.

pub mod config;
pub mod error;
pub mod registry;

pub use config::{
    config_dir, default_cache_path, Config, DiscoverySettings, LinkSettings, PORT_CACHE_FILE,
};
pub use error::{RegistryError, RegistryResult, SettingsError, SettingsResult};
pub use registry::{PortRegistry, DEVICE_FIELD};
