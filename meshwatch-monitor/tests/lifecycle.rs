//! Startup, running loops and shutdown

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use meshwatch_core::{ManualClock, Protocol};
use meshwatch_ml::AnomalyKind;
use meshwatch_monitor::{Monitor, MonitorError, Settings};

#[tokio::test]
async fn test_start_without_discovery_is_fatal() {
    let monitor = Monitor::builder(settings()).build().unwrap();
    let err = monitor.start().await.unwrap_err();
    assert!(matches!(err, MonitorError::NoDiscoveryTransport));
    assert!(err.is_fatal());
    assert!(!monitor.is_running());
}

#[tokio::test]
async fn test_start_with_only_unusable_sources_is_fatal() {
    let clock = ManualClock::new(EPOCH);
    let monitor = Monitor::builder(settings())
        .clock(Arc::new(clock.clone()))
        .discovery(ScriptedDiscovery::unusable(Protocol::Arp, Arc::new(clock.clone())))
        .discovery(ScriptedDiscovery::unusable(Protocol::Mdns, Arc::new(clock.clone())))
        .build()
        .unwrap();
    assert!(matches!(monitor.start().await, Err(MonitorError::NoDiscoveryTransport)));
    assert!(!monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_loops_discover_evaluate_and_deliver() {
    let clock = ManualClock::new(EPOCH);
    let discovery = ScriptedDiscovery::new(Protocol::Arp, Arc::new(clock.clone()));
    let sink = Arc::new(RecordingSink::default());
    let monitor = Monitor::builder(settings())
        .clock(Arc::new(clock.clone()))
        .discovery(ScriptedDiscovery::unusable(Protocol::Ssdp, Arc::new(clock.clone())))
        .discovery(discovery.clone())
        .sink(sink.clone())
        .build()
        .unwrap();
    discovery.show(device(20));

    monitor.start().await.unwrap();
    assert!(monitor.is_running());
    assert!(matches!(monitor.start().await, Err(MonitorError::AlreadyRunning)));

    // Anomaly runs at 0 s and 60 s, delivery every 10 s
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert!(monitor.registry().get(&device(20)).is_some());
    assert!(sink.kinds().contains(&AnomalyKind::NewDevice));
    assert!(monitor.task_stats("discovery").unwrap().runs() >= 3);
    assert_eq!(monitor.task_stats("anomaly").unwrap().failures(), 0);
    assert!(monitor.task_stats("unknown").is_none());

    monitor.shutdown().await;
    assert!(!monitor.is_running());
    assert!(monitor.task_stats("discovery").is_none());

    // Stopped loops do no more work
    let delivered = sink.received.lock().len();
    discovery.show(device(21));
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(monitor.registry().get(&device(21)).is_none());
    assert_eq!(sink.received.lock().len(), delivered);
}

#[test]
fn test_settings_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "locator": {{ "knn": {{ "k": 5 }} }},
            "monitor": {{ "discovery_period_secs": 60, "cooldowns": {{ "default_secs": 600 }} }}
        }}"#
    )
    .unwrap();

    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.locator.knn.k, 5);
    assert_eq!(settings.monitor.discovery_period_secs, 60);
    assert_eq!(settings.monitor.cooldowns.default_secs, 600);
    assert_eq!(settings.monitor.telemetry_period_secs, 15);
    assert!(Monitor::builder(settings).build().is_ok());
}

#[test]
fn test_settings_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(Settings::from_file(&missing), Err(MonitorError::Config(_))));

    let invalid = dir.path().join("invalid.json");
    std::fs::write(&invalid, r#"{ "monitor": { "anomaly_period_secs": 0 } }"#).unwrap();
    assert!(Settings::from_file(&invalid).is_err());
}
