//! Port cache persistence
//!
//! Stores the last station port that discovery matched as a small JSON
//! document. There is no history: every save overwrites the previous record.
//! The document must carry a string `device` field; any other fields are
//! kept as-is.
//!
//! A missing file, invalid JSON or a record without `device` all read back
//! as "no cache". None of them is an error for the caller.

use crate::config::default_cache_path;
use crate::error::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use stationkit_core::PortDescriptor;
use std::path::{Path, PathBuf};

/// Name of the required field in a stored record
pub const DEVICE_FIELD: &str = "device";

/// JSON-file backed cache of the last known station port
///
/// All operations on one instance are serialized by an internal lock, so an
/// `Arc<PortRegistry>` can be shared by several links and discoverers.
#[derive(Debug)]
pub struct PortRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PortRegistry {
    /// Open a registry backed by `path`, creating its directory if needed
    pub fn new(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                tracing::error!("Failed to create registry directory {}: {}", dir.display(), e);
                RegistryError::Directory(format!("{}: {}", dir.display(), e))
            })?;
            tracing::debug!("Registry directory ready: {}", dir.display());
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Registry at the platform default location
    pub fn at_default_location() -> RegistryResult<Self> {
        Self::new(default_cache_path())
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a descriptor, replacing any previous record
    pub fn save(&self, descriptor: &PortDescriptor) -> RegistryResult<()> {
        let value = serde_json::to_value(descriptor)?;
        self.save_record(&value)
    }

    /// Persist an arbitrary JSON object that carries a string `device` field
    ///
    /// A record without `device` is rejected and the stored value is left
    /// untouched.
    pub fn save_record(&self, record: &Value) -> RegistryResult<()> {
        if device_of(record).is_none() {
            tracing::error!("Refusing to save port record without '{}'", DEVICE_FIELD);
            return Err(RegistryError::MissingDevice);
        }

        let content = serde_json::to_string_pretty(record)?;
        let _guard = self.lock.lock();
        match std::fs::write(&self.path, content) {
            Ok(()) => {
                tracing::info!("Port information saved to {}", self.path.display());
                tracing::debug!("Saved record: {}", record);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to save port record to {}: {}", self.path.display(), e);
                Err(e.into())
            }
        }
    }

    /// Load the cached descriptor, if a usable one exists
    ///
    /// Fields written by other tools in other shapes do not invalidate the
    /// record; see [`PortDescriptor::from_record`].
    pub fn load(&self) -> Option<PortDescriptor> {
        PortDescriptor::from_record(&self.load_record()?)
    }

    /// Name of the cached port, if any
    pub fn cached_device(&self) -> Option<String> {
        let record = self.load_record()?;
        record
            .get(DEVICE_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Load the raw cached record, including any extra fields
    pub fn load_record(&self) -> Option<Map<String, Value>> {
        let _guard = self.lock.lock();

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No port cache at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to read port cache {}: {}", self.path.display(), e);
                return None;
            }
        };

        let value: Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Invalid JSON in port cache {}: {}", self.path.display(), e);
                return None;
            }
        };

        device_of(&value)?;
        tracing::info!("Loaded port information from {}", self.path.display());
        tracing::debug!("Loaded record: {}", value);
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Overwrite the cache with an empty record
    pub fn clear(&self) -> RegistryResult<()> {
        let _guard = self.lock.lock();
        match std::fs::write(&self.path, "{}") {
            Ok(()) => {
                tracing::info!("Port cache cleared: {}", self.path.display());
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to clear port cache {}: {}", self.path.display(), e);
                Err(e.into())
            }
        }
    }
}

fn device_of(record: &Value) -> Option<&str> {
    record
        .get(DEVICE_FIELD)
        .and_then(Value::as_str)
        .filter(|device| !device.is_empty())
}
