//! Station link
//!
//! [`DeviceLink`] owns the single serial connection to the station: it
//! resolves which port to use, opens it with a bounded number of
//! rediscovery retries, and provides line-based send and read.
//!
//! A link is meant for sequential use by one caller. Its state is not
//! locked internally; only the shared [`PortRegistry`] is.

use super::serial::{SerialBackend, SerialHandle};
use crate::discovery::{DiscoveryQuery, PortDiscoverer};
use stationkit_core::{ConnectionError, ConnectionState, Error, Result, RetryBudget};
use stationkit_settings::{Config, LinkSettings, PortRegistry};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

/// Single serial connection to the station
pub struct DeviceLink {
    backend: Arc<dyn SerialBackend>,
    discoverer: PortDiscoverer,
    query: DiscoveryQuery,
    settings: LinkSettings,
    port: Option<String>,
    handle: Option<Box<dyn SerialHandle>>,
}

impl DeviceLink {
    /// Create a link and resolve its port from the cache or a fresh scan
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        registry: Arc<PortRegistry>,
        settings: LinkSettings,
        query: DiscoveryQuery,
    ) -> Self {
        let mut link = Self::unresolved(backend, registry, settings, query);
        link.port = link.resolve_port();
        match &link.port {
            Some(port) => tracing::info!("Station link initialized for port {}", port),
            None => tracing::warn!("Station link initialized without a port"),
        }
        link
    }

    /// Create a link bound to a known port, skipping resolution
    pub fn with_port(
        backend: Arc<dyn SerialBackend>,
        registry: Arc<PortRegistry>,
        settings: LinkSettings,
        query: DiscoveryQuery,
        port: impl Into<String>,
    ) -> Self {
        let mut link = Self::unresolved(backend, registry, settings, query);
        link.port = Some(port.into());
        link
    }

    /// Create a link from a loaded configuration, resolving its port
    pub fn from_config(config: &Config, backend: Arc<dyn SerialBackend>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ConnectionError::InvalidParameters {
                reason: e.to_string(),
            })?;
        let registry = PortRegistry::new(&config.discovery.cache_path)
            .map_err(|e| Error::other(format!("Port registry unavailable: {}", e)))?;
        Ok(Self::new(
            backend,
            Arc::new(registry),
            config.link.clone(),
            DiscoveryQuery::from(&config.discovery),
        ))
    }

    fn unresolved(
        backend: Arc<dyn SerialBackend>,
        registry: Arc<PortRegistry>,
        settings: LinkSettings,
        query: DiscoveryQuery,
    ) -> Self {
        Self {
            discoverer: PortDiscoverer::new(Arc::clone(&backend), registry),
            backend,
            query,
            settings,
            port: None,
            handle: None,
        }
    }

    /// Port the link will open
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Point the link at another port; takes effect on the next connect
    pub fn set_port(&mut self, port: impl Into<String>) {
        self.port = Some(port.into());
    }

    /// Link settings
    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Discoverer used for resolution and rediscovery
    pub fn discoverer(&self) -> &PortDiscoverer {
        &self.discoverer
    }

    /// Cached port if it still opens, otherwise a freshly discovered one
    pub fn resolve_port(&self) -> Option<String> {
        if let Some(cached) = self.discoverer.registry().cached_device() {
            if self.verify_available(&cached) {
                tracing::info!("Using cached port: {}", cached);
                return Some(cached);
            }
            tracing::warn!("Cached port {} is unavailable", cached);
        }

        tracing::info!("Searching for the station port");
        match self.discoverer.find(&self.query.without_cache()) {
            Ok(port) if self.verify_available(&port) => {
                tracing::info!("Found station port: {}", port);
                return Some(port);
            }
            Ok(port) => tracing::warn!("Discovered port {} does not open", port),
            Err(e) => tracing::debug!("Discovery failed: {}", e),
        }

        tracing::error!("No usable station port found");
        None
    }

    /// Open and immediately close `port` with the probe timeout
    pub fn verify_available(&self, port: &str) -> bool {
        match self
            .backend
            .open(port, self.settings.baud_rate, self.settings.probe_timeout())
        {
            Ok(mut handle) => {
                if let Err(e) = handle.close() {
                    tracing::debug!("Probe close of {} failed: {}", port, e);
                }
                true
            }
            Err(e) => {
                tracing::debug!("Port {} unavailable: {}", port, e);
                false
            }
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// True iff a handle exists and the OS reports it open
    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| handle.is_open())
    }

    /// Open the link, rediscovering the port after each failed attempt
    ///
    /// Already connected is success. At most `max_retries + 1` opens are
    /// attempted, each retry preceded by one uncached discovery run.
    pub fn connect(&mut self) -> Result<()> {
        let Some(mut port) = self.port.clone() else {
            tracing::error!("No port resolved, cannot connect");
            return Err(ConnectionError::NoPortResolved.into());
        };

        if self.is_connected() {
            tracing::warn!("Already connected to {}", port);
            return Ok(());
        }
        self.handle = None;

        let mut budget = RetryBudget::new(self.settings.max_retries);
        loop {
            tracing::info!(
                "Connecting to {} (baud_rate={})",
                port,
                self.settings.baud_rate
            );
            let reason = match self
                .backend
                .open(&port, self.settings.baud_rate, self.settings.timeout())
            {
                Ok(handle) => {
                    self.handle = Some(handle);
                    std::thread::sleep(self.settings.settle_delay());
                    tracing::info!("Connected to {}", port);
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!("Failed to connect to {}: {}", port, e);
                    e.to_string()
                }
            };

            if !budget.try_consume() {
                return Err(ConnectionError::RetriesExhausted {
                    port,
                    attempts: budget.attempts(),
                }
                .into());
            }
            tracing::info!(
                "Reconnect attempt {}/{}",
                budget.used(),
                budget.max_retries()
            );

            match self.rediscover() {
                Some(found) => {
                    port = found;
                    self.port = Some(port.clone());
                }
                None => {
                    return Err(ConnectionError::FailedToOpen { port, reason }.into());
                }
            }
        }
    }

    fn rediscover(&self) -> Option<String> {
        tracing::info!("Searching for a new station port");
        match self.discoverer.find(&self.query.without_cache()) {
            Ok(port) => {
                tracing::info!("Port updated: {}", port);
                Some(port)
            }
            Err(e) => {
                tracing::warn!("Rediscovery failed: {}", e);
                None
            }
        }
    }

    /// Close the link
    ///
    /// Not connected is a no-op. The handle is dropped even when the close
    /// itself fails.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            tracing::warn!("No active connection to close");
            return Ok(());
        };
        if !handle.is_open() {
            tracing::warn!("No active connection to close");
            return Ok(());
        }

        let port = self.port.as_deref().unwrap_or("<unknown>");
        tracing::info!("Closing connection to {}", port);
        match handle.close() {
            Ok(()) => {
                tracing::info!("Connection to {} closed", port);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error while closing {}: {}", port, e);
                Err(ConnectionError::SerialError {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().inspect_err(|_| {
            tracing::error!("Could not restore the connection");
        })
    }

    /// Send one command line, reconnecting once if needed
    ///
    /// A write failure closes the link so the next call reconnects.
    pub fn send(&mut self, command: &str) -> Result<()> {
        self.ensure_connected()?;
        let Some(handle) = self.handle.as_mut() else {
            return Err(ConnectionError::NotConnected.into());
        };

        tracing::debug!("Sending command: {}", command.trim());
        let line = format!("{}\n", command);
        if let Err(e) = handle.write_all(line.as_bytes()) {
            tracing::error!("Failed to send command: {}", e);
            let _ = self.disconnect();
            return Err(ConnectionError::SerialError {
                reason: e.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Read one trimmed response line, reconnecting once if needed
    ///
    /// `timeout` overrides the configured timeout for this call only.
    /// `Ok(None)` means nothing arrived before the timeout.
    pub fn read(&mut self, timeout: Option<Duration>) -> Result<Option<String>> {
        self.ensure_connected()?;
        let Some(handle) = self.handle.as_mut() else {
            return Err(ConnectionError::NotConnected.into());
        };

        let original = handle.timeout();
        if let Some(timeout) = timeout {
            handle.set_timeout(timeout).map_err(|e| ConnectionError::SerialError {
                reason: e.to_string(),
            })?;
        }

        let result = handle.read_line();

        if timeout.is_some() {
            if let Err(e) = handle.set_timeout(original) {
                tracing::warn!("Failed to restore read timeout: {}", e);
            }
        }

        match result {
            Ok(line) => {
                let line = line.map(|l| l.trim().to_string());
                if let Some(line) = &line {
                    tracing::debug!("Received: {}", line);
                }
                Ok(line)
            }
            Err(e) => {
                tracing::error!("Failed to read response: {}", e);
                Err(ConnectionError::SerialError {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    /// Connect and return a guard that disconnects when dropped
    pub fn session(&mut self) -> Result<LinkSession<'_>> {
        self.connect()?;
        Ok(LinkSession { link: self })
    }

    /// Run `f` on a connected link, disconnecting afterwards on every path
    pub fn with_session<T>(&mut self, f: impl FnOnce(&mut DeviceLink) -> Result<T>) -> Result<T> {
        let mut session = self.session()?;
        f(&mut session)
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.disconnect();
        }
    }
}

/// Connected scope of a [`DeviceLink`]
///
/// Derefs to the link; dropping the session closes the connection.
pub struct LinkSession<'a> {
    link: &'a mut DeviceLink,
}

impl Deref for LinkSession<'_> {
    type Target = DeviceLink;

    fn deref(&self) -> &DeviceLink {
        self.link
    }
}

impl DerefMut for LinkSession<'_> {
    fn deref_mut(&mut self) -> &mut DeviceLink {
        self.link
    }
}

impl Drop for LinkSession<'_> {
    fn drop(&mut self) {
        if self.link.is_connected() {
            if let Err(e) = self.link.disconnect() {
                tracing::warn!("Session close failed: {}", e);
            }
        }
    }
}
