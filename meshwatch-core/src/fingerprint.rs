//! Fingerprint Store
//!
//! ## Overview
//!
//! Calibration walks a device around the site and records, at each surveyed
//! location, the RSSI every anchor sees. The store buckets those recordings
//! by grid cell and keeps running statistics per anchor:
//!
//! ```text
//! (x, y) ──round to cell──→ CellKey ──→ LocationFingerprint
//!                                        ├── location      (mean of points added)
//!                                        ├── anchors       anchor → {count, mean, var, min, max}
//!                                        ├── measurement_count
//!                                        └── confidence    min(0.95, count / 10)
//! ```
//!
//! ## Concurrency
//!
//! Read-mostly: live estimation takes a shared lock, calibration takes the
//! exclusive lock for the duration of one point update.
//!
//! ## Scaling
//!
//! Every query scans all stored cells, O(N). That is fine for calibration
//! sized maps (hundreds to low thousands of cells); a spatial index is the
//! upgrade path if sites grow beyond that.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};
use crate::geometry::{AnchorId, Point, Readings};
use crate::time::Timestamp;

/// Store parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Grid cell edge length (meters)
    pub cell_size: f64,
    /// Confidence ceiling
    pub max_confidence: f64,
    /// Samples at which confidence would reach 1.0 before the ceiling
    pub full_confidence_samples: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.5,
            max_confidence: 0.95,
            full_confidence_samples: 10,
        }
    }
}

impl FingerprintConfig {
    /// Range checks
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.cell_size > 0.0) {
            return Err(CoreError::InvalidConfig("fingerprint cell_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.max_confidence) || self.full_confidence_samples == 0 {
            return Err(CoreError::InvalidConfig("fingerprint confidence parameters out of range".into()));
        }
        Ok(())
    }
}

/// Grid cell index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    /// Column
    pub x: i64,
    /// Row
    pub y: i64,
}

impl CellKey {
    /// Cell containing `point`
    pub fn for_point(point: &Point, cell_size: f64) -> Self {
        Self {
            x: (point.x / cell_size).round() as i64,
            y: (point.y / cell_size).round() as i64,
        }
    }
}

/// Running RSSI statistics for one anchor in one cell (Welford)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorStats {
    /// Observations folded in
    pub count: u64,
    /// Running mean (dBm)
    pub mean: f64,
    m2: f64,
    /// Weakest observation
    pub min: f64,
    /// Strongest observation
    pub max: f64,
}

impl AnchorStats {
    fn new(first: f64) -> Self {
        Self {
            count: 1,
            mean: first,
            m2: 0.0,
            min: first,
            max: first,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Population variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// Aggregated calibration data for one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFingerprint {
    /// Mean of the calibration locations that fell in this cell
    pub location: Point,
    /// Cell index
    pub cell: CellKey,
    /// Per-anchor statistics
    pub anchors: BTreeMap<AnchorId, AnchorStats>,
    /// Calibration points added to this cell
    pub measurement_count: u64,
    /// `min(max_confidence, measurement_count / full_confidence_samples)`
    pub confidence: f64,
    /// Time of the latest update
    pub timestamp: Timestamp,
    /// Room label, first one supplied wins
    pub room: Option<String>,
}

impl LocationFingerprint {
    /// Mean RSSI per anchor
    pub fn mean_readings(&self) -> Readings {
        self.anchors.iter().map(|(a, s)| (a.clone(), s.mean)).collect()
    }
}

/// Result of one `add_point` call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    /// Cell updated
    pub cell: CellKey,
    /// New measurement count
    pub measurement_count: u64,
    /// New confidence
    pub confidence: f64,
}

/// A stored fingerprint compared against a query
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintMatch {
    /// Fingerprint location
    pub location: Point,
    /// Fingerprint confidence
    pub confidence: f64,
    /// Euclidean RSSI distance over shared anchors (dB)
    pub distance: f64,
    /// Mean squared RSSI difference over shared anchors (dB²)
    pub mean_squared_diff: f64,
    /// Anchors present in both
    pub shared_anchors: usize,
}

/// Calibration map
#[derive(Debug, Default)]
pub struct FingerprintStore {
    config: FingerprintConfig,
    cells: RwLock<BTreeMap<CellKey, LocationFingerprint>>,
}

impl FingerprintStore {
    /// Empty store
    pub fn new(config: FingerprintConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cells: RwLock::new(BTreeMap::new()),
        })
    }

    /// Record one calibration point
    ///
    /// Non-finite readings are rejected before anything is written, so a bad
    /// point leaves the store untouched.
    pub fn add_point(
        &self,
        location: Point,
        readings: &Readings,
        timestamp: Timestamp,
        room: Option<&str>,
    ) -> CoreResult<CalibrationSummary> {
        if !location.is_finite() {
            return Err(CoreError::Parse {
                field: "location",
                reason: "coordinates must be finite".into(),
            });
        }
        if let Some((anchor, value)) = readings.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CoreError::Parse {
                field: "rssi",
                reason: format!("anchor {} reading {} is not finite", anchor, value),
            });
        }

        let cell = CellKey::for_point(&location, self.config.cell_size);
        let mut cells = self.cells.write();
        let fp = cells.entry(cell).or_insert_with(|| LocationFingerprint {
            location,
            cell,
            anchors: BTreeMap::new(),
            measurement_count: 0,
            confidence: 0.0,
            timestamp,
            room: room.map(str::to_string),
        });

        fp.measurement_count += 1;
        let n = fp.measurement_count as f64;
        fp.location = Point::new(
            fp.location.x + (location.x - fp.location.x) / n,
            fp.location.y + (location.y - fp.location.y) / n,
        );
        for (anchor, &rssi) in readings {
            fp.anchors
                .entry(anchor.clone())
                .and_modify(|s| s.push(rssi))
                .or_insert_with(|| AnchorStats::new(rssi));
        }
        fp.confidence = (fp.measurement_count as f64 / self.config.full_confidence_samples as f64)
            .min(self.config.max_confidence);
        fp.timestamp = fp.timestamp.max(timestamp);
        if fp.room.is_none() {
            fp.room = room.map(str::to_string);
        }

        log::debug!(
            "calibration cell=({},{}) count={} confidence={:.2}",
            cell.x,
            cell.y,
            fp.measurement_count,
            fp.confidence
        );

        Ok(CalibrationSummary {
            cell,
            measurement_count: fp.measurement_count,
            confidence: fp.confidence,
        })
    }

    /// Compare `readings` with every stored cell sharing at least one anchor
    ///
    /// Results are in cell order; callers sort as they need.
    pub fn scan(&self, readings: &Readings) -> Vec<FingerprintMatch> {
        let cells = self.cells.read();
        cells
            .values()
            .filter_map(|fp| {
                let mut sum_sq = 0.0;
                let mut shared = 0usize;
                for (anchor, rssi) in readings {
                    if let Some(stats) = fp.anchors.get(anchor) {
                        sum_sq += (rssi - stats.mean).powi(2);
                        shared += 1;
                    }
                }
                (shared > 0).then(|| FingerprintMatch {
                    location: fp.location,
                    confidence: fp.confidence,
                    distance: sum_sq.sqrt(),
                    mean_squared_diff: sum_sq / shared as f64,
                    shared_anchors: shared,
                })
            })
            .collect()
    }

    /// The `k` nearest fingerprints by RSSI distance, ascending
    pub fn query(&self, readings: &Readings, k: usize) -> Vec<FingerprintMatch> {
        let mut matches = self.scan(readings);
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);
        matches
    }

    /// Fingerprint stored for `cell`
    pub fn get(&self, cell: CellKey) -> Option<LocationFingerprint> {
        self.cells.read().get(&cell).cloned()
    }

    /// Fingerprint for the cell containing `location`
    pub fn get_at(&self, location: &Point) -> Option<LocationFingerprint> {
        self.get(CellKey::for_point(location, self.config.cell_size))
    }

    /// Copy of every stored fingerprint, in cell order
    pub fn snapshot(&self) -> Vec<LocationFingerprint> {
        self.cells.read().values().cloned().collect()
    }

    /// Number of populated cells
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// True before any calibration
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Store parameters
    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::readings;

    fn store() -> FingerprintStore {
        FingerprintStore::new(FingerprintConfig::default()).unwrap()
    }

    #[test]
    fn test_confidence_ramp_and_cap() {
        let s = store();
        let r = readings([("a", -60.0), ("b", -70.0)]);
        let mut last = 0.0;
        for i in 1..=15u64 {
            let summary = s.add_point(Point::new(1.0, 1.0), &r, i, None).unwrap();
            assert_eq!(summary.measurement_count, i);
            assert!(summary.confidence >= last);
            last = summary.confidence;
        }
        assert_eq!(last, 0.95);
        let fp = s.get_at(&Point::new(1.0, 1.0)).unwrap();
        assert_eq!(fp.anchors[&AnchorId::from("a")].mean, -60.0);
        assert_eq!(fp.anchors[&AnchorId::from("a")].count, 15);
        assert_eq!(fp.anchors[&AnchorId::from("a")].variance(), 0.0);
    }

    #[test]
    fn test_bucketing() {
        let s = store();
        let r = readings([("a", -60.0)]);
        s.add_point(Point::new(1.0, 1.0), &r, 0, None).unwrap();
        s.add_point(Point::new(1.1, 0.9), &r, 0, None).unwrap();
        s.add_point(Point::new(3.0, 1.0), &r, 0, None).unwrap();
        assert_eq!(s.len(), 2);

        let fp = s.get_at(&Point::new(1.0, 1.0)).unwrap();
        assert_eq!(fp.measurement_count, 2);
        assert!((fp.location.x - 1.05).abs() < 1e-12);
    }

    #[test]
    fn test_welford_statistics() {
        let s = store();
        for v in [-60.0, -62.0, -64.0] {
            s.add_point(Point::new(0.0, 0.0), &readings([("a", v)]), 0, Some("lab")).unwrap();
        }
        let fp = s.get_at(&Point::ORIGIN).unwrap();
        let stats = fp.anchors[&AnchorId::from("a")];
        assert!((stats.mean + 62.0).abs() < 1e-12);
        assert!((stats.variance() - 8.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.min, -64.0);
        assert_eq!(stats.max, -60.0);
        assert_eq!(fp.room.as_deref(), Some("lab"));
    }

    #[test]
    fn test_query_orders_by_distance() {
        let s = store();
        s.add_point(Point::new(0.0, 0.0), &readings([("a", -40.0), ("b", -80.0)]), 0, None).unwrap();
        s.add_point(Point::new(5.0, 0.0), &readings([("a", -60.0), ("b", -60.0)]), 0, None).unwrap();
        s.add_point(Point::new(9.0, 0.0), &readings([("c", -50.0)]), 0, None).unwrap();

        let hits = s.query(&readings([("a", -58.0), ("b", -62.0)]), 5);
        assert_eq!(hits.len(), 2, "cell without shared anchors is skipped");
        assert_eq!(hits[0].location, Point::new(5.0, 0.0));
        assert!((hits[0].distance - 8f64.sqrt()).abs() < 1e-12);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn test_rejects_non_finite() {
        let s = store();
        let bad = readings([("a", f64::NAN)]);
        assert!(s.add_point(Point::ORIGIN, &bad, 0, None).is_err());
        assert!(s.is_empty());
        assert!(s.add_point(Point::new(f64::INFINITY, 0.0), &readings([("a", -50.0)]), 0, None).is_err());
    }
}
