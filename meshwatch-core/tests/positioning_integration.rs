//! End-to-end positioning tests
//!
//! Covers:
//! - Trilateration on a noiseless square site
//! - Degradation paths with missing anchors and an empty fingerprint store
//! - Calibration followed by fingerprint-based estimation
//! - Track smoothing of noisy fixes

mod common;

use meshwatch_core::{
    positioning::{EstimateInput, PositionEstimator, Trilaterator},
    Degradation, EstimatorKind, LocatorConfig, Point, RangingSample,
};

use common::{device, noiseless_readings, noisy_readings, site, TestRng, SQUARE};

#[test]
fn test_square_site_recovers_center() {
    let (locator, _clock) = site(&SQUARE, LocatorConfig::default());
    let readings = noiseless_readings(&SQUARE, Point::new(5.0, 5.0));

    let fused = locator.estimate_location(&device(1), &readings);
    let tri = &fused.components[0];
    assert_eq!(tri.kind, EstimatorKind::Trilateration);
    assert!(
        tri.estimate.location.distance_to(&Point::new(5.0, 5.0)) < 0.5,
        "trilateration at {}",
        tri.estimate.location
    );
    assert!(fused.location.distance_to(&Point::new(5.0, 5.0)) < 0.5);
}

#[test]
fn test_off_center_targets() {
    let (locator, _clock) = site(&SQUARE, LocatorConfig::default());
    for (i, target) in [Point::new(2.0, 3.0), Point::new(8.0, 1.5), Point::new(6.5, 9.0)]
        .into_iter()
        .enumerate()
    {
        let readings = noiseless_readings(&SQUARE, target);
        let fused = locator.estimate_location(&device(i as u8), &readings);
        let tri = &fused.components[0].estimate;
        assert!(tri.location.distance_to(&target) < 0.01, "{} vs {}", tri.location, target);
    }
}

#[test]
fn test_two_anchors_degrade_but_never_fail() {
    let (locator, _clock) = site(&SQUARE[..2], LocatorConfig::default());
    let readings = noiseless_readings(&SQUARE[..2], Point::new(5.0, 5.0));
    let fused = locator.estimate_location(&device(1), &readings);

    let tri = &fused.components[0].estimate;
    assert_eq!(tri.location, Point::new(5.0, 0.0));
    assert_eq!(tri.uncertainty, 100.0);
    assert_eq!(tri.confidence, 0.0);
    assert!(matches!(
        tri.degradation,
        Some(Degradation::InsufficientAnchors { usable: 2, required: 3 })
    ));
    // No usable fix means no track either
    assert!(fused.components.iter().all(|c| c.kind != EstimatorKind::KalmanTrack));
    assert!(fused.confidence < 1e-9);
}

#[test]
fn test_calibrated_site_uses_fingerprints() {
    let (locator, _clock) = site(&SQUARE, LocatorConfig::default());
    for x in (0..=10).step_by(2) {
        for y in (0..=10).step_by(2) {
            let p = Point::new(x as f64, y as f64);
            let r = noiseless_readings(&SQUARE, p);
            for _ in 0..10 {
                locator.add_calibration_point(p, &r, None).unwrap();
            }
        }
    }
    assert_eq!(locator.fingerprints().len(), 36);

    let target = Point::new(4.0, 6.0);
    let fused = locator.estimate_location(&device(3), &noiseless_readings(&SQUARE, target));
    let knn = fused
        .components
        .iter()
        .find(|c| c.kind == EstimatorKind::FingerprintKnn)
        .unwrap();
    assert!(!knn.estimate.is_degraded());
    assert!(knn.estimate.location.distance_to(&target) < 0.1, "{}", knn.estimate.location);
    assert!(knn.estimate.confidence > 0.8);
    assert!(fused.location.distance_to(&target) < 0.5);
    assert!(fused.degradations().is_empty());
}

#[test]
fn test_track_smooths_noisy_fixes() {
    let (locator, clock) = site(&SQUARE, LocatorConfig::default());
    let mut rng = TestRng::new(7);
    let target = Point::new(5.0, 5.0);

    let mut last = None;
    for _ in 0..40 {
        clock.advance(1_000);
        let readings = noisy_readings(&SQUARE, target, 3.0, &mut rng);
        last = Some(locator.estimate_location(&device(9), &readings));
    }
    let fused = last.unwrap();
    let track = fused
        .components
        .iter()
        .find(|c| c.kind == EstimatorKind::KalmanTrack)
        .unwrap();
    assert!(track.estimate.location.distance_to(&target) < 1.5, "{}", track.estimate.location);
    assert_eq!(locator.tracks().state(&device(9)).unwrap().updates, 40);
}

#[test]
fn test_smoothed_samples_feed_estimation() {
    let (locator, clock) = site(&SQUARE, LocatorConfig::default());
    let readings = noiseless_readings(&SQUARE, Point::new(3.0, 7.0));
    for _ in 0..5 {
        clock.advance(500);
        for (anchor, rssi) in &readings {
            let sample = RangingSample {
                device_id: device(4),
                anchor_id: anchor.clone(),
                rssi: *rssi,
                timestamp: 0,
            };
            locator.ingest_sample(&sample).unwrap();
        }
    }
    let fused = locator.estimate_current(&device(4));
    assert!(fused.components[0].estimate.location.distance_to(&Point::new(3.0, 7.0)) < 0.01);
}

#[test]
fn test_room_exponent_changes_range() {
    use meshwatch_core::ranging::{EnvironmentConfig, EnvironmentModel, PathLossConfig, PathLossModel};
    use meshwatch_core::{positioning::AnchorRegistry, Anchor};
    use std::sync::Arc;

    let anchors = Arc::new(AnchorRegistry::new());
    anchors.register(Anchor::new("open", Point::ORIGIN)).unwrap();
    anchors.register(Anchor::new("walled", Point::new(5.0, 0.0)).in_room("garage")).unwrap();
    let tri = Trilaterator::new(
        Default::default(),
        anchors,
        Arc::new(PathLossModel::new(PathLossConfig::default().with_room_exponent("garage", 3.5)).unwrap()),
        Arc::new(EnvironmentModel::new(EnvironmentConfig::default()).unwrap()),
    );
    let readings = meshwatch_core::readings([("open", -79.0), ("walled", -79.0)]);
    let ranged = tri.ranged_anchors(&EstimateInput { readings: &readings, timestamp: 0 });
    assert!(ranged[1].range < ranged[0].range);
    assert!(tri.estimate(&EstimateInput { readings: &readings, timestamp: 0 }).is_degraded());
}
