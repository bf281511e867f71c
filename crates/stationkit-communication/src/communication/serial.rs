//! Serial port communication implementation
//!
//! Provides the OS boundary of the station link:
//! - Port enumeration with USB vendor/product metadata
//! - Opening a port at a baud rate with a read/write timeout
//! - Line-oriented blocking reads and writes
//!
//! Everything above this module talks to [`SerialBackend`] and
//! [`SerialHandle`], so the link and discovery logic can run against an
//! in-memory backend in tests.

use stationkit_core::{DiscoveryError, RawPortInfo, Result};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// An open serial connection
pub trait SerialHandle: Send {
    /// Write all bytes to the port
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read one `\n`-terminated line, without the terminator
    ///
    /// Returns `Ok(None)` when the timeout passes with nothing received. If
    /// the timeout passes mid-line the partial text is returned.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Current read/write timeout
    fn timeout(&self) -> Duration;

    /// Change the read/write timeout
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Whether the OS handle is still open
    fn is_open(&self) -> bool;

    /// Close the port. Closing twice is a no-op.
    fn close(&mut self) -> io::Result<()>;
}

/// Access to the platform serial driver
pub trait SerialBackend: Send + Sync {
    /// Enumerate available ports in OS order
    fn available_ports(&self) -> Result<Vec<RawPortInfo>>;

    /// Open `port` at `baud_rate` with the given timeout
    fn open(&self, port: &str, baud_rate: u32, timeout: Duration)
        -> io::Result<Box<dyn SerialHandle>>;
}

/// Serial backend using the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

impl SystemSerial {
    /// Create the system backend
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for SystemSerial {
    fn available_ports(&self) -> Result<Vec<RawPortInfo>> {
        match serialport::available_ports() {
            Ok(ports) => Ok(ports.iter().map(to_raw_port).collect()),
            Err(e) => {
                tracing::error!("Failed to enumerate serial ports: {}", e);
                Err(DiscoveryError::Enumeration {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> io::Result<Box<dyn SerialHandle>> {
        match serialport::new(port, baud_rate).timeout(timeout).open() {
            Ok(inner) => Ok(Box::new(SystemSerialHandle::new(port, inner))),
            Err(e) => {
                tracing::debug!("Failed to open serial port {}: {}", port, e);
                Err(e.into())
            }
        }
    }
}

/// Convert an enumeration record from `serialport`
fn to_raw_port(port: &serialport::SerialPortInfo) -> RawPortInfo {
    let mut raw = RawPortInfo::new(&port.port_name);
    raw.description = port_description(&port.port_type);
    raw.hwid = hardware_id(&port.port_type);

    if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
        raw.vid = Some(usb.vid);
        raw.pid = Some(usb.pid);
        raw.serial_number = usb.serial_number.clone();
        raw.manufacturer = usb.manufacturer.clone();
        raw.product = usb.product.clone();
        // interface is only reported with serialport's usbportinfo-interface feature
    }
    raw
}

/// Get a user-friendly description for a port
///
/// Unknown port types have no description.
fn port_description(port_type: &serialport::SerialPortType) -> Option<String> {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => Some(format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        )),
        serialport::SerialPortType::BluetoothPort => Some("Bluetooth Serial".to_string()),
        serialport::SerialPortType::PciPort => Some("PCI Serial".to_string()),
        serialport::SerialPortType::Unknown => None,
    }
}

/// Hardware id in the `USB VID:PID=xxxx:xxxx SER=...` style
fn hardware_id(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
            if let Some(serial) = &usb.serial_number {
                hwid.push_str(" SER=");
                hwid.push_str(serial);
            }
            hwid
        }
        serialport::SerialPortType::BluetoothPort => "BLUETOOTH".to_string(),
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// Splits a byte stream into `\n`-terminated lines
///
/// Bytes after the last terminator stay buffered for the next call. A
/// trailing `\r` is dropped from each line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from `reader` until a full line is buffered or `timeout` passes
    ///
    /// Read timeouts from `reader` are retried until the deadline. At the
    /// deadline an empty buffer yields `Ok(None)` and a partial line is
    /// returned as-is.
    pub fn read_line<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        timeout: Duration,
    ) -> io::Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if let Some(line) = self.take_line() {
                        return Ok(Some(line));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let partial = std::mem::take(&mut self.pending);
                return Ok(Some(decode(&partial)));
            }
        }
    }

    /// Whether bytes are waiting for a terminator
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(decode(&line[..pos]))
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Open `serialport` connection with line buffering
pub struct SystemSerialHandle {
    name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
    lines: LineBuffer,
}

impl SystemSerialHandle {
    fn new(name: &str, port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            name: name.to_string(),
            port: Some(port),
            lines: LineBuffer::new(),
        }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl SerialHandle for SystemSerialHandle {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let timeout = self.timeout();
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))?;
        self.lines.read_line(port.as_mut(), timeout)
    }

    fn timeout(&self) -> Duration {
        self.port
            .as_ref()
            .map(|port| port.timeout())
            .unwrap_or_default()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port_mut()?.set_timeout(timeout)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            tracing::debug!("Closed serial port {}", self.name);
        }
        self.lines.clear();
        Ok(())
    }
}
