//! Time management for the monitoring engine
//!
//! Provides a clock abstraction so every component that stamps or compares
//! times can be driven by either:
//! - System clock (production)
//! - Manual clock (tests, replay of recorded sessions)
//!
//! Calendar lookups (hour of day, day of week) used by the environment model
//! and seasonal statistics are derived from the millisecond timestamp in UTC.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Timestamp in milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Milliseconds per second
pub const MS_PER_SECOND: u64 = 1_000;

/// Milliseconds per minute
pub const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;

/// Milliseconds per hour
pub const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Milliseconds per day
pub const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Source of time for the system
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs manual/replay)
    fn is_wall_clock(&self) -> bool;
}

/// System time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Manually advanced clock
///
/// Clones share the same underlying counter, so a test can hold one handle
/// while the engine under test holds another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    timestamp: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp: Arc::new(AtomicU64::new(timestamp)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, timestamp: Timestamp) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.timestamp.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.timestamp.load(Ordering::SeqCst)
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

fn to_datetime(timestamp: Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(i64::try_from(timestamp).ok()?)
}

/// Hour of day (0-23, UTC) for a timestamp
pub fn hour_of_day(timestamp: Timestamp) -> usize {
    to_datetime(timestamp).map(|dt| dt.hour() as usize).unwrap_or(0)
}

/// Day of week (0 = Monday .. 6 = Sunday, UTC) for a timestamp
pub fn day_of_week(timestamp: Timestamp) -> usize {
    to_datetime(timestamp)
        .map(|dt| dt.weekday().num_days_from_monday() as usize)
        .unwrap_or(0)
}

/// Elapsed milliseconds, saturating at zero if `later` precedes `earlier`
pub fn elapsed_ms(earlier: Timestamp, later: Timestamp) -> u64 {
    later.saturating_sub(earlier)
}
