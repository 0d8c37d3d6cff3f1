//! Planar geometry primitives and anchor registry types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A 2-D location in site coordinates (meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// East-west coordinate
    pub x: f64,
    /// North-south coordinate
    pub y: f64,
}

impl Point {
    /// Origin
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    /// Construct a point
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Squared distance to `other`
    pub fn distance_sq(&self, other: &Point) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    /// True when both coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Weighted centroid of `(point, weight)` pairs
    ///
    /// Returns `None` when the weights sum to zero.
    pub fn weighted_centroid<'a, I>(items: I) -> Option<Point>
    where
        I: IntoIterator<Item = (&'a Point, f64)>,
    {
        let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
        for (p, w) in items {
            sx += p.x * w;
            sy += p.y * w;
            sw += w;
        }
        if sw <= 0.0 || !sw.is_finite() {
            return None;
        }
        Some(Point::new(sx / sw, sy / sw))
    }

    /// Unweighted centroid; `None` for an empty set
    pub fn centroid<'a, I>(points: I) -> Option<Point>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        Self::weighted_centroid(points.into_iter().map(|p| (p, 1.0)))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Anchor identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    /// Construct from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AnchorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AnchorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference point with known coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    /// Identifier matched against `RangingSample::anchor_id`
    pub id: AnchorId,
    /// Surveyed position
    pub position: Point,
    /// Room the anchor is installed in, selects the path-loss exponent
    #[serde(default)]
    pub room: Option<String>,
    /// Per-anchor RSSI at the reference distance, overrides the model default
    #[serde(default)]
    pub reference_power: Option<f64>,
}

impl Anchor {
    /// Anchor at `position` with model defaults
    pub fn new(id: impl Into<AnchorId>, position: Point) -> Self {
        Self {
            id: id.into(),
            position,
            room: None,
            reference_power: None,
        }
    }

    /// Assign a room
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Override reference power
    pub fn with_reference_power(mut self, dbm: f64) -> Self {
        self.reference_power = Some(dbm);
        self
    }
}

/// RSSI per anchor for one device at one instant
///
/// Ordered so every iteration over readings is deterministic.
pub type Readings = BTreeMap<AnchorId, f64>;

/// Build [`Readings`] from `(anchor, rssi)` pairs
pub fn readings<I, A>(pairs: I) -> Readings
where
    I: IntoIterator<Item = (A, f64)>,
    A: Into<AnchorId>,
{
    pairs.into_iter().map(|(a, r)| (a.into(), r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(a.distance_sq(&b), 25.0);
    }

    #[test]
    fn test_centroids() {
        let pts = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        assert_eq!(Point::centroid(pts.iter()), Some(Point::new(5.0, 0.0)));

        let weighted = Point::weighted_centroid(vec![(&pts[0], 3.0), (&pts[1], 1.0)]).unwrap();
        assert!((weighted.x - 2.5).abs() < 1e-12);

        assert_eq!(Point::centroid(std::iter::empty()), None);
    }

    #[test]
    fn test_readings_are_ordered() {
        let r = readings([("c", -70.0), ("a", -50.0), ("b", -60.0)]);
        let keys: Vec<&str> = r.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
