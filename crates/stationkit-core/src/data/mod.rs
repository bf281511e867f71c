//! Data models for ports, connection state and motion
//!
//! This module provides:
//! - Port enumeration records and normalized port descriptors
//! - Connection state and the reconnect retry budget
//! - Machine positions and absolute motion requests

pub mod motion;
pub mod port;

pub use motion::{MachinePosition, MotionRequest, DEFAULT_FEED_RATE};
pub use port::{PortDescriptor, RawPortInfo};

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the single station link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No open handle
    #[default]
    Disconnected,
    /// Handle open and settled
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Counter of failed open attempts within one `connect` call
///
/// Total attempts per call never exceed `max_retries + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    used: u32,
    max_retries: u32,
}

impl RetryBudget {
    /// Fresh budget allowing `max_retries` retries after the first attempt
    pub fn new(max_retries: u32) -> Self {
        Self {
            used: 0,
            max_retries,
        }
    }

    /// Consume one retry, returning false once the budget is spent
    pub fn try_consume(&mut self) -> bool {
        if self.used < self.max_retries {
            self.used += 1;
            true
        } else {
            false
        }
    }

    /// Retries consumed so far
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Configured maximum number of retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Open attempts made so far, counting the first
    pub fn attempts(&self) -> u32 {
        self.used + 1
    }
}
