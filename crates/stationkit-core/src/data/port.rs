//! Serial port records
//!
//! [`RawPortInfo`] is what an enumeration pass yields; [`PortDescriptor`] is
//! the normalized, timestamped form that discovery returns and the port
//! registry persists.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Information about an enumerated serial port, as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Human-readable description, if the platform provides one
    pub description: Option<String>,

    /// Hardware id string (e.g., "USB VID:PID=1A86:7523 SER=...")
    pub hwid: String,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// Physical bus location if available
    pub location: Option<String>,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Product name if available
    pub product: Option<String>,

    /// USB interface if available
    pub interface: Option<String>,
}

impl RawPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set hardware id
    pub fn with_hwid(mut self, hwid: impl Into<String>) -> Self {
        self.hwid = hwid.into();
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set product
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set bus location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set USB interface
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Vendor/product pair, when both are known
    pub fn usb_ids(&self) -> Option<(u16, u16)> {
        self.vid.zip(self.pid)
    }
}

/// Normalized metadata about one serial port
///
/// `device` is always present. Everything else depends on what the
/// platform reported during enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Port name used to open the device
    pub device: String,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Hardware id string
    #[serde(default)]
    pub hwid: String,
    /// USB vendor ID
    #[serde(default)]
    pub vid: Option<u16>,
    /// USB product ID
    #[serde(default)]
    pub pid: Option<u16>,
    /// Serial number
    #[serde(default)]
    pub serial_number: Option<String>,
    /// Physical bus location
    #[serde(default)]
    pub location: Option<String>,
    /// Manufacturer string
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Product string
    #[serde(default)]
    pub product: Option<String>,
    /// USB interface
    #[serde(default)]
    pub interface: Option<String>,
    /// When this descriptor was produced
    #[serde(default = "Utc::now")]
    pub found_at: DateTime<Utc>,
}

impl PortDescriptor {
    /// Create a descriptor carrying only a device name, stamped now
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            description: None,
            hwid: String::new(),
            vid: None,
            pid: None,
            serial_number: None,
            location: None,
            manufacturer: None,
            product: None,
            interface: None,
            found_at: Utc::now(),
        }
    }

    /// Build a descriptor from an enumeration record, stamped now
    pub fn from_raw(raw: &RawPortInfo) -> Self {
        Self {
            device: raw.port_name.clone(),
            description: raw.description.clone(),
            hwid: raw.hwid.clone(),
            vid: raw.vid,
            pid: raw.pid,
            serial_number: raw.serial_number.clone(),
            location: raw.location.clone(),
            manufacturer: raw.manufacturer.clone(),
            product: raw.product.clone(),
            interface: raw.interface.clone(),
            found_at: Utc::now(),
        }
    }

    /// Read a descriptor out of a stored JSON record
    ///
    /// Only a non-empty string `device` is required. Other fields are read
    /// best-effort: a value of the wrong shape becomes `None` (or an empty
    /// `hwid`) and an unreadable `found_at` becomes now. Unknown fields are
    /// ignored.
    pub fn from_record(record: &Map<String, Value>) -> Option<Self> {
        let device = record
            .get("device")
            .and_then(Value::as_str)
            .filter(|device| !device.is_empty())?;

        let text = |key: &str| record.get(key).and_then(record_text);
        let usb_id = |key: &str| record.get(key).and_then(record_usb_id);

        Some(Self {
            device: device.to_string(),
            description: text("description"),
            hwid: text("hwid").unwrap_or_default(),
            vid: usb_id("vid"),
            pid: usb_id("pid"),
            serial_number: text("serial_number"),
            location: text("location"),
            manufacturer: text("manufacturer"),
            product: text("product"),
            interface: text("interface"),
            found_at: record
                .get("found_at")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
        })
    }
}

fn record_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers are taken as-is; strings are read as hex (`"1A86"`, `"0x1a86"`).
fn record_usb_id(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .unwrap_or(s);
            u16::from_str_radix(digits, 16).ok()
        }
        _ => None,
    }
}

/// RFC 3339, or an ISO timestamp without offset taken as UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_port_builder() {
        let raw = RawPortInfo::new("/dev/ttyUSB0")
            .with_description("USB-SERIAL CH340")
            .with_usb_ids(0x1A86, 0x7523)
            .with_serial_number("A1B2");

        assert_eq!(raw.port_name, "/dev/ttyUSB0");
        assert_eq!(raw.usb_ids(), Some((0x1A86, 0x7523)));
        assert_eq!(raw.serial_number.as_deref(), Some("A1B2"));
        assert!(raw.location.is_none());
    }

    #[test]
    fn test_usb_ids_need_both() {
        let mut raw = RawPortInfo::new("COM3");
        raw.vid = Some(0x2341);
        assert_eq!(raw.usb_ids(), None);
    }

    #[test]
    fn test_descriptor_from_raw() {
        let raw = RawPortInfo::new("COM4")
            .with_description("Arduino Uno")
            .with_hwid("USB VID:PID=2341:0043")
            .with_usb_ids(0x2341, 0x0043);
        let desc = PortDescriptor::from_raw(&raw);

        assert_eq!(desc.device, "COM4");
        assert_eq!(desc.description.as_deref(), Some("Arduino Uno"));
        assert_eq!(desc.hwid, "USB VID:PID=2341:0043");
        assert_eq!(desc.vid, Some(0x2341));
        assert_eq!(desc.pid, Some(0x0043));
    }

    #[test]
    fn test_interface_carried_from_raw() {
        let raw = RawPortInfo::new("/dev/ttyACM1").with_interface("1");
        assert_eq!(PortDescriptor::from_raw(&raw).interface.as_deref(), Some("1"));
        assert!(PortDescriptor::new("COM9").interface.is_none());
    }

    #[test]
    fn test_from_record_tolerates_foreign_shapes() {
        let record = serde_json::json!({
            "device": "COM5",
            "found_at": "2024-05-01T10:00:00.123456",
            "vid": "1A86",
            "pid": 29987,
            "description": ["not", "a", "string"],
            "baud": "9600"
        });
        let desc = PortDescriptor::from_record(record.as_object().unwrap()).unwrap();

        assert_eq!(desc.device, "COM5");
        assert_eq!(desc.vid, Some(0x1A86));
        assert_eq!(desc.pid, Some(0x7523));
        assert!(desc.description.is_none());
        assert_eq!(desc.hwid, "");
        assert_eq!(
            desc.found_at.to_rfc3339(),
            "2024-05-01T10:00:00.123456+00:00"
        );
    }

    #[test]
    fn test_from_record_bad_values_fall_back() {
        let record = serde_json::json!({
            "device": "/dev/ttyUSB0",
            "vid": "zzzz",
            "pid": 70000,
            "found_at": "yesterday"
        });
        let before = Utc::now();
        let desc = PortDescriptor::from_record(record.as_object().unwrap()).unwrap();

        assert!(desc.vid.is_none());
        assert!(desc.pid.is_none());
        assert!(desc.found_at >= before);
    }

    #[test]
    fn test_from_record_needs_device() {
        for record in [
            serde_json::json!({}),
            serde_json::json!({"device": ""}),
            serde_json::json!({"device": 3}),
        ] {
            assert!(PortDescriptor::from_record(record.as_object().unwrap()).is_none());
        }
    }

    #[test]
    fn test_from_record_reads_saved_descriptor() {
        let raw = RawPortInfo::new("COM4")
            .with_description("Arduino Uno")
            .with_usb_ids(0x2341, 0x0043)
            .with_interface("0");
        let saved = PortDescriptor::from_raw(&raw);
        let value = serde_json::to_value(&saved).unwrap();

        let loaded = PortDescriptor::from_record(value.as_object().unwrap()).unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_descriptor_json_field_names() {
        let desc = PortDescriptor::new("/dev/ttyACM0");
        let value = serde_json::to_value(&desc).unwrap();
        assert_eq!(value["device"], "/dev/ttyACM0");
        assert!(value.get("found_at").is_some());
        assert!(value.get("serial_number").is_some());
    }
}
