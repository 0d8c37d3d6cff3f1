//! Identity-change detector
//!
//! A hardware address is expected to keep claiming the same vendor, type and
//! protocol. The first sighting is informational; a later change of any
//! known field is treated as possible spoofing.

use serde_json::json;

use super::{AnomalyDetector, Detection};
use crate::{AnomalyKind, DetectionMethod, DeviceHistory, Severity, Telemetry};

/// Confidence attached to a first sighting
const NEW_DEVICE_CONFIDENCE: f64 = 0.3;

/// Confidence attached to a property change
const PROPERTY_CHANGE_CONFIDENCE: f64 = 0.9;

/// Compares the sighting's identity tuple with the last committed one
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDetector;

impl AnomalyDetector for IdentityDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Identity
    }

    fn detect(&self, history: &DeviceHistory, telemetry: &Telemetry) -> Detection {
        let current = telemetry.identity();
        let Some(previous) = history.identity() else {
            return Detection {
                method: self.method(),
                fired: true,
                score: 1.0,
                confidence: NEW_DEVICE_CONFIDENCE,
                kind: AnomalyKind::NewDevice,
                severity: Severity::Low,
                description: format!(
                    "New device {} ({}) seen via {}",
                    telemetry.device_id,
                    current.vendor.as_deref().unwrap_or("unknown vendor"),
                    current.protocol
                ),
                details: json!({ "identity": current }),
            };
        };

        let changed = current.changed_fields(previous);
        if changed.is_empty() {
            return Detection::quiet(self.method(), AnomalyKind::PropertyChange, 0.0);
        }
        Detection {
            method: self.method(),
            fired: true,
            score: changed.len() as f64,
            confidence: PROPERTY_CHANGE_CONFIDENCE,
            kind: AnomalyKind::PropertyChange,
            severity: Severity::High,
            description: format!(
                "Device {} changed {} since it was last seen",
                telemetry.device_id,
                changed.join(", ")
            ),
            details: json!({
                "changed": changed,
                "previous": previous,
                "current": current,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_core::{DeviceId, DeviceType, Protocol};

    fn device() -> DeviceId {
        DeviceId::from_octets([2, 0, 0, 0, 0, 6])
    }

    fn sighting() -> Telemetry {
        Telemetry::new(device(), Protocol::Mdns, 0)
            .with_vendor("Sonos")
            .with_type(DeviceType::SmartSpeaker)
    }

    #[test]
    fn test_first_sighting_is_new_device() {
        let d = IdentityDetector.detect(&DeviceHistory::new(device()), &sighting());
        assert!(d.fired);
        assert_eq!(d.kind, AnomalyKind::NewDevice);
        assert_eq!(d.severity, Severity::Low);
    }

    #[test]
    fn test_same_identity_is_quiet() {
        let mut h = DeviceHistory::new(device());
        h.record(&sighting());
        assert!(!IdentityDetector.detect(&h, &sighting()).fired);

        // Vendor case and unknown fields are not changes
        let vague = Telemetry::new(device(), Protocol::Mdns, 1).with_vendor("SONOS");
        assert!(!IdentityDetector.detect(&h, &vague).fired);
    }

    #[test]
    fn test_changed_vendor_is_property_change() {
        let mut h = DeviceHistory::new(device());
        h.record(&sighting());
        let spoof = sighting().with_vendor("Espressif").with_type(DeviceType::SmartPlug);
        let d = IdentityDetector.detect(&h, &spoof);
        assert!(d.fired);
        assert_eq!(d.kind, AnomalyKind::PropertyChange);
        assert_eq!(d.severity, Severity::High);
        assert_eq!(d.details["changed"], json!(["vendor", "type"]));
    }
}
