//! Serial transport and the station link

pub mod link;
pub mod serial;

pub use link::{DeviceLink, LinkSession};
pub use serial::{LineBuffer, SerialBackend, SerialHandle, SystemSerial, SystemSerialHandle};
