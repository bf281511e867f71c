//! Port classification
//!
//! Pure checks on enumeration records: whether a port is virtual, and the
//! normalized descriptor of a port.

use stationkit_core::{PortDescriptor, RawPortInfo};

/// Description markers of ports not backed by local hardware
pub const VIRTUAL_MARKERS: [&str; 5] = ["bluetooth", "virtual", "com0com", "tcp", "network"];

/// Classifies enumerated serial ports
pub struct PortClassifier;

impl PortClassifier {
    /// True if the description contains a virtual-port marker (case-insensitive)
    ///
    /// A port without a description is treated as physical.
    pub fn is_virtual(port: &RawPortInfo) -> bool {
        let Some(description) = port.description.as_deref() else {
            tracing::debug!("Port {} has no description, treating as physical", port.port_name);
            return false;
        };

        let description = description.to_lowercase();
        let is_virtual = VIRTUAL_MARKERS
            .iter()
            .any(|marker| description.contains(marker));

        if is_virtual {
            tracing::info!("Port {} identified as virtual", port.port_name);
        } else {
            tracing::debug!("Port {} treated as physical", port.port_name);
        }
        is_virtual
    }

    /// Normalized descriptor of `port`, stamped with the current time
    pub fn normalize(port: Option<&RawPortInfo>) -> Option<PortDescriptor> {
        let Some(port) = port else {
            tracing::warn!("No port given to normalize");
            return None;
        };
        let descriptor = PortDescriptor::from_raw(port);
        tracing::debug!("Port descriptor: {:?}", descriptor);
        Some(descriptor)
    }
}
