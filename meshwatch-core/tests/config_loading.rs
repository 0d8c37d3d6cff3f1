//! Config file loading

use std::io::Write;

use meshwatch_core::{CoreError, LocatorConfig};

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "pathLoss": {{ "reference_power": -62.0, "room_exponents": {{ "garage": 3.5 }} }},
            "environment": {{ "occupancy_loss_db": 3.0 }},
            "kernel": {{ "gamma": 4.0, "top_n": 6 }}
        }}"#
    )
    .unwrap();

    let config = LocatorConfig::from_file(file.path()).unwrap();
    assert_eq!(config.path_loss.reference_power, -62.0);
    assert_eq!(config.path_loss.room_exponents["garage"], 3.5);
    assert_eq!(config.environment.occupancy_loss_db, 3.0);
    assert_eq!(config.environment.hour_multipliers.len(), 24);
    assert_eq!(config.kernel.top_n, 6);
    assert_eq!(config.knn.k, 5);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = LocatorConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, CoreError::ConfigIo(_)));
}

#[test]
fn test_invalid_values_in_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "environment": {{ "day_multipliers": [1.0, 1.0] }} }}"#).unwrap();
    let err = LocatorConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfig(_)));
}

#[test]
fn test_round_trip_through_json() {
    let config = LocatorConfig::default();
    let json = serde_json::to_string_pretty(&config).unwrap();
    assert_eq!(LocatorConfig::from_json_str(&json).unwrap(), config);
}
