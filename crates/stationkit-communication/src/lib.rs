//! # StationKit Communication
//!
//! Serial link to a GRBL station: port enumeration and classification,
//! tiered port discovery with a persistent cache, a retrying connection
//! with line I/O, and the homing / move protocol on top of it.

pub mod communication;
pub mod discovery;
pub mod firmware;

pub use communication::{
    DeviceLink, LineBuffer, LinkSession, SerialBackend, SerialHandle, SystemSerial,
    SystemSerialHandle,
};
pub use discovery::{known_device_label, DiscoveryQuery, PortClassifier, PortDiscoverer};
pub use firmware::{MotionProtocol, StatusParser};
