//! Station port discovery
//!
//! Finds the serial port the station is attached to. Tiers are tried in
//! order and the first hit wins:
//!
//! 1. the cached port, if it still shows up in a fresh enumeration
//! 2. an exact USB vendor/product id match
//! 3. a known bridge chip or board whose label matches a preferred name
//! 4. a description matching the station patterns
//!
//! Within a tier the OS enumeration order decides. Every match from tiers
//! 2-4 is written to the port registry.

use super::classifier::PortClassifier;
use crate::communication::serial::SerialBackend;
use regex::Regex;
use stationkit_core::{DiscoveryError, RawPortInfo, Result};
use stationkit_settings::{DiscoverySettings, PortRegistry, RegistryResult};
use std::sync::{Arc, OnceLock};

/// USB-serial bridges and boards commonly found in station controllers
pub const KNOWN_DEVICES: [((u16, u16), &str); 5] = [
    ((0x1A86, 0x7523), "CH340 Serial Adapter"),
    ((0x2341, 0x0043), "Arduino Uno"),
    ((0x2341, 0x0001), "Arduino Mega"),
    ((0x0403, 0x6001), "FTDI FT232"),
    ((0x10C4, 0xEA60), "CP210x Serial Adapter"),
];

/// Label of a known device by vendor/product id
pub fn known_device_label(vid: u16, pid: u16) -> Option<&'static str> {
    KNOWN_DEVICES
        .iter()
        .find(|(ids, _)| *ids == (vid, pid))
        .map(|(_, label)| *label)
}

/// Description patterns, most specific first
fn description_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(?i)laser", r"(?i)cnc|grbl|serial|usb|ch34|arduino"]
            .iter()
            .map(|p| Regex::new(p).expect("invalid regex pattern"))
            .collect()
    })
}

/// Parameters of one discovery run
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryQuery {
    /// Exact USB vendor id (only used together with `pid`)
    pub vid: Option<u16>,
    /// Exact USB product id (only used together with `vid`)
    pub pid: Option<u16>,
    /// Substrings of known device labels to prefer
    pub preferred_devices: Vec<String>,
    /// Skip virtual ports in the preferred and pattern tiers
    pub skip_virtual: bool,
    /// Try the cached port first
    pub use_cache: bool,
}

impl Default for DiscoveryQuery {
    fn default() -> Self {
        Self {
            vid: None,
            pid: None,
            preferred_devices: Vec::new(),
            skip_virtual: true,
            use_cache: true,
        }
    }
}

impl From<&DiscoverySettings> for DiscoveryQuery {
    fn from(settings: &DiscoverySettings) -> Self {
        Self {
            vid: settings.vid,
            pid: settings.pid,
            preferred_devices: settings.preferred_devices.clone(),
            skip_virtual: settings.skip_virtual,
            use_cache: settings.use_cache,
        }
    }
}

impl DiscoveryQuery {
    /// Match this exact vendor/product pair
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Prefer known devices whose label contains one of `names`
    pub fn with_preferred<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_devices = names.into_iter().map(Into::into).collect();
        self
    }

    /// Same query, bypassing the cache
    pub fn without_cache(&self) -> Self {
        Self {
            use_cache: false,
            ..self.clone()
        }
    }
}

/// Finds the station port among the enumerated serial ports
#[derive(Clone)]
pub struct PortDiscoverer {
    backend: Arc<dyn SerialBackend>,
    registry: Arc<PortRegistry>,
}

impl PortDiscoverer {
    /// Create a discoverer over `backend`, caching matches in `registry`
    pub fn new(backend: Arc<dyn SerialBackend>, registry: Arc<PortRegistry>) -> Self {
        Self { backend, registry }
    }

    /// The registry matches are cached in
    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    /// Find the station port name
    pub fn find(&self, query: &DiscoveryQuery) -> Result<String> {
        tracing::info!("Searching for station port");

        let ports = self.backend.available_ports()?;

        if query.use_cache {
            if let Some(cached) = self.cached_port(&ports) {
                tracing::info!("Using cached port: {}", cached);
                return Ok(cached);
            }
        }

        if ports.is_empty() {
            tracing::warn!("No serial ports found");
            return Err(DiscoveryError::NoPorts.into());
        }
        tracing::debug!("Found {} serial ports", ports.len());

        let found = self
            .find_by_usb_ids(query, &ports)
            .or_else(|| self.find_by_preferred(query, &ports))
            .or_else(|| self.find_by_pattern(query, &ports));

        match found {
            Some(port) => {
                self.remember(port);
                Ok(port.port_name.clone())
            }
            None => {
                tracing::warn!("No port matched the station criteria");
                Err(DiscoveryError::NoMatch.into())
            }
        }
    }

    /// Clear the cached port
    pub fn clear_cache(&self) -> RegistryResult<()> {
        tracing::info!("Clearing port cache");
        self.registry.clear().inspect_err(|e| {
            tracing::warn!("Failed to clear port cache: {}", e);
        })
    }

    fn cached_port(&self, ports: &[RawPortInfo]) -> Option<String> {
        tracing::debug!("Checking cached port");
        let cached = self.registry.cached_device()?;
        if ports.iter().any(|p| p.port_name == cached) {
            tracing::info!("Cached port confirmed: {}", cached);
            Some(cached)
        } else {
            tracing::debug!("Cached port {} is no longer present", cached);
            None
        }
    }

    fn find_by_usb_ids<'a>(
        &self,
        query: &DiscoveryQuery,
        ports: &'a [RawPortInfo],
    ) -> Option<&'a RawPortInfo> {
        let wanted = query.vid.zip(query.pid)?;
        tracing::debug!("Matching VID/PID {:04X}/{:04X}", wanted.0, wanted.1);

        let port = ports.iter().find(|p| p.usb_ids() == Some(wanted))?;
        tracing::info!("Found port by VID/PID: {}", port.port_name);
        Some(port)
    }

    fn find_by_preferred<'a>(
        &self,
        query: &DiscoveryQuery,
        ports: &'a [RawPortInfo],
    ) -> Option<&'a RawPortInfo> {
        if query.preferred_devices.is_empty() {
            return None;
        }
        tracing::debug!("Matching preferred devices: {:?}", query.preferred_devices);

        let preferred: Vec<String> = query
            .preferred_devices
            .iter()
            .map(|name| name.to_lowercase())
            .collect();

        self.candidates(query, ports).find(|port| {
            let Some(label) = port.usb_ids().and_then(|(v, p)| known_device_label(v, p)) else {
                return false;
            };
            let label_lower = label.to_lowercase();
            let hit = preferred.iter().any(|name| label_lower.contains(name));
            if hit {
                tracing::info!("Found preferred device: {} ({})", port.port_name, label);
            }
            hit
        })
    }

    fn find_by_pattern<'a>(
        &self,
        query: &DiscoveryQuery,
        ports: &'a [RawPortInfo],
    ) -> Option<&'a RawPortInfo> {
        tracing::debug!("Matching port descriptions");
        self.candidates(query, ports).find(|port| {
            let description = port.description.as_deref().unwrap_or_default();
            let hit = description_patterns()
                .iter()
                .any(|pattern| pattern.is_match(description));
            if hit {
                tracing::info!("Found port by pattern: {} ({})", port.port_name, description);
            }
            hit
        })
    }

    fn candidates<'a>(
        &self,
        query: &DiscoveryQuery,
        ports: &'a [RawPortInfo],
    ) -> impl Iterator<Item = &'a RawPortInfo> {
        let skip_virtual = query.skip_virtual;
        ports.iter().filter(move |port| {
            if skip_virtual && PortClassifier::is_virtual(port) {
                tracing::debug!("Skipping virtual port: {}", port.port_name);
                false
            } else {
                true
            }
        })
    }

    fn remember(&self, port: &RawPortInfo) {
        let Some(descriptor) = PortClassifier::normalize(Some(port)) else {
            return;
        };
        match self.registry.save(&descriptor) {
            Ok(()) => tracing::debug!("Port information cached"),
            Err(e) => tracing::warn!("Failed to cache port information: {}", e),
        }
    }
}
