//! Fixed-Size Circular Buffer for Signal History
//!
//! ## Overview
//!
//! Detectors and trend analysis look at a sliding window of recent RSSI
//! observations per device. This module provides a ring buffer with a
//! capacity fixed at compile time through const generics, plus summary
//! statistics over the RSSI specialization.
//!
//! ## Design Rationale
//!
//! - O(1) insertion, overwriting the oldest entry once full
//! - O(1) access to the most recent entry
//! - Chronological iteration (oldest first)
//! - Per-device memory is bounded no matter how long a device is tracked
//!
//! ```text
//! CircularBuffer<5> after 7 pushes (values 0..=6):
//! ┌─────┬─────┬─────┬─────┬─────┐
//! │  5  │  6  │  2  │  3  │  4  │  ← physical slots
//! └─────┴─────┴─────┴─────┴─────┘
//!              ↑
//!              └── write_pos = 2, also the oldest entry
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use meshwatch_core::buffer::{RssiSample, SignalWindow};
//!
//! let mut window: SignalWindow<8> = SignalWindow::new();
//! window.push(RssiSample::new(-60.0, 1_000));
//! window.push(RssiSample::new(-62.0, 2_000));
//!
//! assert_eq!(window.mean(), Some(-61.0));
//! ```

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Fixed-size circular buffer for time-series data
///
/// ## Internal Invariants
///
/// - `write_pos < N`
/// - `len <= N`
/// - Iteration yields items in insertion order
///
/// Not thread-safe; owners wrap it in their own lock.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T, const N: usize> {
    data: [Option<T>; N],
    write_pos: usize,
    len: usize,
}

impl<T, const N: usize> CircularBuffer<T, N> {
    /// Creates a new empty circular buffer
    pub fn new() -> Self {
        Self {
            data: std::array::from_fn(|_| None),
            write_pos: 0,
            len: 0,
        }
    }

    /// Adds an item, overwriting the oldest one when full
    pub fn push(&mut self, item: T) {
        if N == 0 {
            return;
        }
        self.data[self.write_pos] = Some(item);
        self.write_pos = (self.write_pos + 1) % N;

        if self.len < N {
            self.len += 1;
        }
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing has been pushed since the last clear
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once `N` items are held
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Compile-time capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Most recent item
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        let idx = if self.write_pos == 0 { N - 1 } else { self.write_pos - 1 };
        self.data[idx].as_ref()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> CircularBufferIter<'_, T, N> {
        CircularBufferIter { buffer: self, index: 0 }
    }

    /// Drop every item
    pub fn clear(&mut self) {
        for slot in self.data.iter_mut() {
            *slot = None;
        }
        self.write_pos = 0;
        self.len = 0;
    }

    /// Logical index (0 = oldest) to stored item
    ///
    /// ```text
    /// Physical array:  [D, E, A, B, C]  (write_pos = 2)
    /// Logical view:    [A, B, C, D, E]
    /// logical[i] = physical[(write_pos + i) % N]
    /// ```
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let actual_index = if self.len < N {
            index
        } else {
            (self.write_pos + index) % N
        };
        self.data[actual_index].as_ref()
    }
}

impl<T, const N: usize> Default for CircularBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over circular buffer contents
pub struct CircularBufferIter<'a, T, const N: usize> {
    buffer: &'a CircularBuffer<T, N>,
    index: usize,
}

impl<'a, T, const N: usize> Iterator for CircularBufferIter<'a, T, N> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.buffer.get(self.index)?;
        self.index += 1;
        Some(item)
    }
}

/// One RSSI observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RssiSample {
    /// Signal strength (dBm)
    pub rssi: f64,
    /// Observation time
    pub timestamp: Timestamp,
}

impl RssiSample {
    /// Construct a sample
    pub const fn new(rssi: f64, timestamp: Timestamp) -> Self {
        Self { rssi, timestamp }
    }
}

/// Sliding window of RSSI samples
pub type SignalWindow<const N: usize> = CircularBuffer<RssiSample, N>;

impl<const N: usize> CircularBuffer<RssiSample, N> {
    /// RSSI values oldest first
    pub fn values(&self) -> Vec<f64> {
        self.iter().map(|s| s.rssi).collect()
    }

    /// Arithmetic mean
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().map(|s| s.rssi).sum::<f64>() / self.len as f64)
    }

    /// Population variance
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        Some(self.iter().map(|s| (s.rssi - mean).powi(2)).sum::<f64>() / self.len as f64)
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Least-squares slope in dB per sample over the newest `max_points`
    ///
    /// Zero for fewer than two points.
    pub fn slope(&self, max_points: usize) -> f64 {
        let n = self.len.min(max_points);
        if n < 2 {
            return 0.0;
        }
        let start = self.len - n;

        let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
        for (i, sample) in self.iter().skip(start).enumerate() {
            let x = i as f64;
            sum_x += x;
            sum_y += sample.rssi;
            sum_xy += x * sample.rssi;
            sum_xx += x * x;
        }

        let n_f = n as f64;
        let denom = n_f * sum_xx - sum_x * sum_x;
        if denom.abs() < f64::EPSILON {
            return 0.0;
        }
        (n_f * sum_xy - sum_x * sum_y) / denom
    }
}
