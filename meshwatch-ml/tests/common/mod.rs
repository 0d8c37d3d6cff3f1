//! Shared fixtures for ml integration tests

#![allow(dead_code)]

use meshwatch_core::{time::MS_PER_MINUTE, DeviceId, DeviceType, Protocol};
use meshwatch_ml::{AnomalyEnsemble, DeviceHistory, Telemetry};

/// Device id from a small integer
pub fn device(n: u8) -> DeviceId {
    DeviceId::from_octets([0x02, 0, 0, 0, 0, n])
}

/// One Wi-Fi sighting of a router at `minute`
pub fn sighting(n: u8, rssi: f64, minute: u64) -> Telemetry {
    Telemetry::new(device(n), Protocol::Wifi, minute * MS_PER_MINUTE)
        .with_rssi(rssi)
        .with_vendor("Netgear")
        .with_type(DeviceType::Router)
}

/// History holding `values` at one-minute spacing, committed through the ensemble
pub fn warmed_history(ensemble: &AnomalyEnsemble, n: u8, values: &[f64]) -> DeviceHistory {
    let mut history = DeviceHistory::new(device(n));
    for (i, v) in values.iter().enumerate() {
        ensemble.evaluate_and_record(&mut history, &sighting(n, *v, i as u64));
    }
    history
}
