mod common;

use common::{ch340, fast_settings, query, registry, MockBackend};
use stationkit_communication::DeviceLink;
use stationkit_core::{ConnectionError, ConnectionState, Error, PortDescriptor, RawPortInfo};
use stationkit_settings::Config;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn link_on(backend: &MockBackend, dir: &TempDir, port: &str) -> DeviceLink {
    DeviceLink::with_port(
        Arc::new(backend.clone()),
        registry(dir),
        fast_settings(),
        query(),
        port,
    )
}

#[test]
fn test_connect_retries_then_fails() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    backend.fail_open("COM3");
    let mut link = link_on(&backend, &dir, "COM3");

    let err = link.connect().unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::RetriesExhausted { attempts: 4, .. })
    ));
    // One open per attempt, one uncached discovery per retry.
    assert_eq!(backend.opens(), vec!["COM3"; 4]);
    assert_eq!(backend.list_calls(), 3);
    assert!(!link.is_connected());
}

#[test]
fn test_zero_retries_skip_rediscovery() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    backend.fail_open("COM3");
    let mut settings = fast_settings();
    settings.max_retries = 0;
    let mut link = DeviceLink::with_port(
        Arc::new(backend.clone()),
        registry(&dir),
        settings,
        query(),
        "COM3",
    );

    assert!(link.connect().is_err());
    assert_eq!(backend.opens().len(), 1);
    assert_eq!(backend.list_calls(), 0);
}

#[test]
fn test_connect_follows_rediscovered_port() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM9");

    link.connect().unwrap();
    assert_eq!(link.port(), Some("COM3"));
    assert_eq!(backend.opens(), vec!["COM9", "COM3"]);
    assert_eq!(link.state(), ConnectionState::Connected);

    let dir_registry = registry(&dir);
    assert_eq!(dir_registry.load().unwrap().device, "COM3");
}

#[test]
fn test_connect_fails_when_rediscovery_finds_nothing() {
    let dir = TempDir::new().unwrap();
    let backend =
        MockBackend::new(vec![RawPortInfo::new("COM1").with_description("Communications Port")]);
    let mut link = link_on(&backend, &dir, "COM9");

    let err = link.connect().unwrap_err();
    match err {
        Error::Connection(ConnectionError::FailedToOpen { port, .. }) => assert_eq!(port, "COM9"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unresolved_port_fails_fast() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(Vec::new());
    let mut link = DeviceLink::new(
        Arc::new(backend.clone()),
        registry(&dir),
        fast_settings(),
        query(),
    );

    assert_eq!(link.port(), None);
    assert!(matches!(
        link.connect(),
        Err(Error::Connection(ConnectionError::NoPortResolved))
    ));
    assert!(link.send("?").is_err());
    assert!(link.read(None).is_err());
    assert!(backend.opens().is_empty());
}

#[test]
fn test_resolve_prefers_cached_port_that_opens() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3"), RawPortInfo::new("COM5")]);
    let registry = registry(&dir);
    registry.save(&PortDescriptor::new("COM5")).unwrap();

    let link = DeviceLink::new(Arc::new(backend.clone()), registry, fast_settings(), query());
    assert_eq!(link.port(), Some("COM5"));
    assert_eq!(backend.list_calls(), 0);
    // The availability check opened and closed the port.
    assert_eq!(backend.opens(), vec!["COM5"]);
    assert_eq!(backend.closes(), 1);
    assert!(!link.is_connected());
}

#[test]
fn test_resolve_reads_device_from_foreign_record() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3"), RawPortInfo::new("COM5")]);
    let registry = registry(&dir);
    registry
        .save_record(&serde_json::json!({
            "device": "COM5",
            "found_at": "2024-05-01T10:00:00.123456",
            "pid": "not-a-number"
        }))
        .unwrap();

    let link = DeviceLink::new(Arc::new(backend.clone()), registry, fast_settings(), query());
    assert_eq!(link.port(), Some("COM5"));
    assert_eq!(backend.list_calls(), 0);
}

#[test]
fn test_resolve_replaces_unavailable_cached_port() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let registry = registry(&dir);
    registry.save(&PortDescriptor::new("COM8")).unwrap();

    let link = DeviceLink::new(
        Arc::new(backend.clone()),
        Arc::clone(&registry),
        fast_settings(),
        query(),
    );
    assert_eq!(link.port(), Some("COM3"));
    assert_eq!(registry.load().unwrap().device, "COM3");
}

#[test]
fn test_connect_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");

    link.connect().unwrap();
    link.connect().unwrap();
    assert_eq!(backend.opens().len(), 1);
    assert!(link.is_connected());
}

#[test]
fn test_disconnect() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");

    // Not connected is a no-op.
    link.disconnect().unwrap();

    link.connect().unwrap();
    link.disconnect().unwrap();
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(backend.closes(), 1);

    link.disconnect().unwrap();
    assert_eq!(backend.closes(), 1);
}

#[test]
fn test_send_connects_and_appends_newline() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");

    link.send("G0 X1").unwrap();
    assert!(link.is_connected());
    assert_eq!(backend.written(), vec!["G0 X1\n"]);
}

#[test]
fn test_send_failure_disconnects() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");
    link.connect().unwrap();
    backend.fail_writes();

    let err = link.send("?").unwrap_err();
    assert!(err.is_connection_error());
    assert!(!link.is_connected());
    assert_eq!(backend.closes(), 1);
}

#[test]
fn test_read_trims_and_times_out() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")])
        .with_responder(|cmd| match cmd {
            "$I" => vec!["  [VER:1.1h.20190825:]\r".to_string(), "ok".to_string()],
            _ => Vec::new(),
        });
    let mut link = link_on(&backend, &dir, "COM3");

    link.send("$I").unwrap();
    assert_eq!(
        link.read(None).unwrap().as_deref(),
        Some("[VER:1.1h.20190825:]")
    );
    assert_eq!(link.read(None).unwrap().as_deref(), Some("ok"));
    assert_eq!(link.read(None).unwrap(), None);
}

#[test]
fn test_read_timeout_override_is_restored() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");

    assert_eq!(link.read(Some(Duration::from_millis(5))).unwrap(), None);
    let timeouts = backend.state.lock().unwrap().timeouts_set.clone();
    assert_eq!(
        timeouts,
        vec![Duration::from_millis(5), fast_settings().timeout()]
    );

    // No override, no timeout changes.
    link.read(None).unwrap();
    assert_eq!(backend.state.lock().unwrap().timeouts_set.len(), 2);
}

#[test]
fn test_session_disconnects_on_drop() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");

    {
        let mut session = link.session().unwrap();
        session.send("?").unwrap();
        assert!(session.is_connected());
    }
    assert!(!link.is_connected());
    assert_eq!(backend.closes(), 1);
}

#[test]
fn test_with_session_disconnects_on_error() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");

    let result: stationkit_core::Result<()> = link.with_session(|link| {
        link.send("$X")?;
        Err(Error::other("aborted"))
    });
    assert!(result.is_err());
    assert!(!link.is_connected());
    assert_eq!(backend.written(), vec!["$X\n"]);
}

#[test]
fn test_drop_closes_open_link() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut link = link_on(&backend, &dir, "COM3");
    link.connect().unwrap();

    drop(link);
    assert_eq!(backend.closes(), 1);
}

#[test]
fn test_from_config_rejects_invalid_settings() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("COM3")]);
    let mut config = Config::default();
    config.discovery.cache_path = dir.path().join("port_finder.json");
    config.link.baud_rate = 0;

    let result = DeviceLink::from_config(&config, Arc::new(backend));
    assert!(matches!(
        result,
        Err(Error::Connection(ConnectionError::InvalidParameters { .. }))
    ));
}

#[test]
fn test_from_config_resolves_port() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new(vec![ch340("/dev/ttyUSB0")]);
    let mut config = Config::default();
    config.discovery.cache_path = dir.path().join("nested").join("port_finder.json");

    let link = DeviceLink::from_config(&config, Arc::new(backend)).unwrap();
    assert_eq!(link.port(), Some("/dev/ttyUSB0"));
    assert!(dir.path().join("nested").join("port_finder.json").exists());
}
