//! Serial port discovery
//!
//! Classifies enumerated ports and picks the one the station is attached
//! to, caching the match in the port registry.

pub mod classifier;
pub mod finder;

pub use classifier::{PortClassifier, VIRTUAL_MARKERS};
pub use finder::{known_device_label, DiscoveryQuery, PortDiscoverer, KNOWN_DEVICES};
