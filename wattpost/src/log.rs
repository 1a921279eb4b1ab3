//! Read-only access to the device's append-only measurement log.
//!
//! The log store itself lives outside this crate (on the device it is a
//! flash-backed ring of fixed records). The uploader only ever reads it, by
//! timestamp key, through the [`LogStore`] trait. A read at an arbitrary key
//! returns a [`Snapshot`] interpolated between the surrounding records, so
//! the scheduler can walk the log on exact interval boundaries regardless of
//! the native sample spacing.
//!
//! [`MemoryLog`] is a complete in-memory implementation used by hosts,
//! demos, and tests.

use serde::{Deserialize, Serialize};

/// One interpolated read of the log at a timestamp key.
///
/// `channels` holds the cumulative per-channel accumulators (e.g. watt-hours
/// and volt-hours); `log_hours` is the cumulative time the device has
/// actually been logging. Measurements derive rates from the difference of
/// two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp key of this snapshot, epoch seconds.
    pub time: u32,
    /// Cumulative hours of logging up to this snapshot.
    pub log_hours: f64,
    /// Cumulative per-channel accumulators.
    pub channels: Vec<f64>,
}

/// Read-only view of the append-only log, injected into the uploader.
pub trait LogStore {
    /// Timestamp of the earliest retained record, or `0` if the log is empty.
    fn first_key(&self) -> u32;

    /// Timestamp of the most recent record, or `0` if the log is empty.
    fn last_key(&self) -> u32;

    /// Reads the log at `key`, interpolating between surrounding records.
    ///
    /// Keys before the first record clamp to the first record; keys past the
    /// last record clamp to the last.
    fn read_at(&self, key: u32) -> Snapshot;
}

/// In-memory [`LogStore`] backed by a sorted record vector.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Vec<Snapshot>,
}

impl MemoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Records must be pushed in ascending time order;
    /// out-of-order records are ignored.
    pub fn push(&mut self, record: Snapshot) {
        if let Some(last) = self.records.last()
            && record.time <= last.time
        {
            return;
        }
        self.records.push(record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LogStore for MemoryLog {
    fn first_key(&self) -> u32 {
        self.records.first().map_or(0, |r| r.time)
    }

    fn last_key(&self) -> u32 {
        self.records.last().map_or(0, |r| r.time)
    }

    fn read_at(&self, key: u32) -> Snapshot {
        let Some(first) = self.records.first() else {
            return Snapshot {
                time: key,
                log_hours: 0.0,
                channels: Vec::new(),
            };
        };

        if key <= first.time {
            return Snapshot {
                time: key,
                ..first.clone()
            };
        }

        let last = self.records.last().expect("non-empty checked above");
        if key >= last.time {
            return Snapshot {
                time: key,
                ..last.clone()
            };
        }

        // Binary search for the bracketing pair, then interpolate linearly.
        let upper = self
            .records
            .partition_point(|r| r.time < key);
        let hi = &self.records[upper];
        if hi.time == key {
            return hi.clone();
        }
        let lo = &self.records[upper - 1];

        let span = f64::from(hi.time - lo.time);
        let frac = f64::from(key - lo.time) / span;

        let channels = lo
            .channels
            .iter()
            .zip(&hi.channels)
            .map(|(&a, &b)| a + (b - a) * frac)
            .collect();

        Snapshot {
            time: key,
            log_hours: lo.log_hours + (hi.log_hours - lo.log_hours) * frac,
            channels,
        }
    }
}
