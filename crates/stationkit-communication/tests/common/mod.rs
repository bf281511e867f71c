#![allow(dead_code)]

use stationkit_communication::{DiscoveryQuery, SerialBackend, SerialHandle};
use stationkit_core::RawPortInfo;
use stationkit_settings::{LinkSettings, PortRegistry};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Responder = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

// Shared state of the scripted backend, inspected by the tests
#[derive(Default)]
pub struct MockState {
    pub ports: Vec<RawPortInfo>,
    pub failing: HashSet<String>,
    pub list_calls: usize,
    pub opens: Vec<String>,
    pub written: Vec<String>,
    pub timeouts_set: Vec<Duration>,
    pub fail_writes: bool,
    pub closes: usize,
}

// In-memory serial backend with scripted replies
#[derive(Clone)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
    responder: Responder,
}

impl MockBackend {
    pub fn new(ports: Vec<RawPortInfo>) -> Self {
        let state = MockState {
            ports,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            responder: Arc::new(|_| Vec::new()),
        }
    }

    pub fn with_responder(
        mut self,
        responder: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    pub fn fail_open(&self, port: &str) {
        self.state.lock().unwrap().failing.insert(port.to_string());
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn opens(&self) -> Vec<String> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn written(&self) -> Vec<String> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn reset_counters(&self) {
        let mut state = self.state.lock().unwrap();
        state.list_calls = 0;
        state.opens.clear();
        state.written.clear();
        state.closes = 0;
    }
}

impl SerialBackend for MockBackend {
    fn available_ports(&self) -> stationkit_core::Result<Vec<RawPortInfo>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state.ports.clone())
    }

    fn open(
        &self,
        port: &str,
        _baud_rate: u32,
        timeout: Duration,
    ) -> io::Result<Box<dyn SerialHandle>> {
        let mut state = self.state.lock().unwrap();
        state.opens.push(port.to_string());
        if state.failing.contains(port) || !state.ports.iter().any(|p| p.port_name == port) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
        }
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            responder: Arc::clone(&self.responder),
            open: true,
            timeout,
            replies: VecDeque::new(),
        }))
    }
}

pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    responder: Responder,
    open: bool,
    timeout: Duration,
    replies: VecDeque<String>,
}

impl SerialHandle for MockHandle {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        let text = String::from_utf8_lossy(data).into_owned();
        state.written.push(text.clone());
        drop(state);

        let command = text.trim_end_matches('\n');
        self.replies.extend((self.responder)(command));
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.replies.pop_front())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.state.lock().unwrap().timeouts_set.push(timeout);
        self.timeout = timeout;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> io::Result<()> {
        if self.open {
            self.open = false;
            self.state.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

pub fn ch340(name: &str) -> RawPortInfo {
    RawPortInfo::new(name)
        .with_description("USB-SERIAL CH340")
        .with_usb_ids(0x1A86, 0x7523)
}

pub fn registry(dir: &TempDir) -> Arc<PortRegistry> {
    Arc::new(PortRegistry::new(dir.path().join("port_finder.json")).unwrap())
}

pub fn fast_settings() -> LinkSettings {
    LinkSettings {
        settle_delay_ms: 0,
        probe_timeout_ms: 10,
        timeout_ms: 20,
        status_timeout_ms: 20,
        poll_interval_ms: 5,
        motion_margin_ms: 100,
        homing_timeout_ms: 150,
        ..LinkSettings::default()
    }
}

pub fn query() -> DiscoveryQuery {
    DiscoveryQuery::default()
}
