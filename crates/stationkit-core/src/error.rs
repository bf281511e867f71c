//! Error handling for StationKit
//!
//! Provides error types for every layer of a station link:
//! - Connection errors (opening, writing to and reading from the serial link)
//! - Discovery errors (enumerating and matching serial ports)
//! - Controller errors (homing, motion and status queries)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents failures of the physical serial link. All of these are
/// recoverable by reconnecting or rediscovering the port.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// No port could be resolved from the cache or a fresh scan
    #[error("No station port resolved")]
    NoPortResolved,

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Every attempt allowed by the retry budget failed
    #[error("Failed to connect to {port} after {attempts} attempts")]
    RetriesExhausted {
        /// The last port that was tried.
        port: String,
        /// Total number of open attempts made.
        attempts: u32,
    },

    /// Operation requires an open link
    #[error("Link not connected")]
    NotConnected,

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Discovery error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    /// The OS port enumeration call failed
    #[error("Failed to enumerate ports: {reason}")]
    Enumeration {
        /// The reason the enumeration failed.
        reason: String,
    },

    /// Enumeration succeeded but returned nothing
    #[error("No serial ports available")]
    NoPorts,

    /// No port matched any discovery tier
    #[error("No matching station port found")]
    NoMatch,
}

/// Controller error type
///
/// Represents errors reported while driving the motion controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Homing did not acknowledge in time
    #[error("Homing timed out after {timeout_ms}ms")]
    HomingTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Homing cycle failed
    #[error("Homing failed: {reason}")]
    HomingFailed {
        /// The reason the homing cycle failed.
        reason: String,
    },

    /// The current position could not be queried or parsed
    #[error("Current position unavailable")]
    PositionUnavailable,

    /// Command was rejected by controller
    #[error("Command rejected: {reason}")]
    CommandRejected {
        /// The reason the command was rejected.
        reason: String,
    },

    /// A motion request carried an unusable value
    #[error("Invalid motion request: {reason}")]
    InvalidMotion {
        /// Why the request cannot be executed.
        reason: String,
    },
}

/// Main error type for StationKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Discovery error
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::HomingTimeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a discovery error
    pub fn is_discovery_error(&self) -> bool {
        matches!(self, Error::Discovery(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
