//! # StationKit Core
//!
//! Core types and errors shared by the StationKit crates: port records,
//! connection state, positions, motion requests and the unified error type.

pub mod data;
pub mod error;

pub use data::{
    ConnectionState, MachinePosition, MotionRequest, PortDescriptor, RawPortInfo, RetryBudget,
    DEFAULT_FEED_RATE,
};

pub use error::{ConnectionError, ControllerError, DiscoveryError, Error, Result};
