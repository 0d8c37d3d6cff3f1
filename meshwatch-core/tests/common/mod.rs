//! Shared fixtures for core integration tests
//!
//! - Site layouts with registered anchors
//! - Noiseless and noisy RSSI generators based on the default path-loss model
//! - A deterministic RNG so failures reproduce

#![allow(dead_code)]

use std::sync::Arc;

use meshwatch_core::{
    ranging::PathLossModel, Anchor, DeviceId, Locator, LocatorConfig, ManualClock, Point, Readings,
};

/// 10 m square with an anchor at each corner
pub const SQUARE: [(&str, f64, f64); 4] = [
    ("a-sw", 0.0, 0.0),
    ("b-se", 10.0, 0.0),
    ("c-ne", 10.0, 10.0),
    ("d-nw", 0.0, 10.0),
];

/// Locator on a manual clock with `anchors` registered
pub fn site(anchors: &[(&str, f64, f64)], config: LocatorConfig) -> (Locator, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let locator = Locator::new(config, Arc::new(clock.clone())).unwrap();
    for (id, x, y) in anchors {
        locator.register_anchor(Anchor::new(*id, Point::new(*x, *y))).unwrap();
    }
    (locator, clock)
}

/// RSSI the default model predicts at `target` for each anchor
pub fn noiseless_readings(anchors: &[(&str, f64, f64)], target: Point) -> Readings {
    let model = PathLossModel::default();
    anchors
        .iter()
        .map(|(id, x, y)| {
            let d = target.distance_to(&Point::new(*x, *y));
            ((*id).into(), model.expected_rssi(d, -59.0, 2.0))
        })
        .collect()
}

/// Noiseless readings plus uniform noise in ±`amplitude` dB
pub fn noisy_readings(anchors: &[(&str, f64, f64)], target: Point, amplitude: f64, rng: &mut TestRng) -> Readings {
    noiseless_readings(anchors, target)
        .into_iter()
        .map(|(id, rssi)| (id, rssi + rng.gen_range(-amplitude, amplitude)))
        .collect()
}

/// Device id from a small integer
pub fn device(n: u8) -> DeviceId {
    DeviceId::from_octets([0x02, 0, 0, 0, 0, n])
}

/// Xorshift RNG for reproducible test data
pub struct TestRng {
    state: u32,
}

impl TestRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        self.state
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u32() >> 8) as f64 / 16_777_216.0
    }

    pub fn gen_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }
}

#[macro_export]
macro_rules! assert_within_tolerance {
    ($actual:expr, $expected:expr, $tolerance:expr) => {
        let diff = ($actual - $expected).abs();
        if diff > $tolerance {
            panic!(
                "Value {} not within tolerance {} of expected {} (diff: {})",
                $actual, $tolerance, $expected, diff
            );
        }
    };
}
