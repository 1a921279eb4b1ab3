//! Measurement capability and the unit-column model.
//!
//! Measurements are supplied by the caller (on the device they come from the
//! user's output scripts); the uploader only depends on the [`Measurement`]
//! trait. The remote table has one column per unit category, so the sorted
//! measurement list fixes both the CSV header and the width of every row:
//!
//! - [`sort_measurements`] orders the list by (name, unit ordinal) so
//!   same-named measurements become contiguous and unit columns come out in
//!   a deterministic order.
//! - [`ActiveUnits`] is derived once from the sorted list and marks which
//!   unit categories appear in output at all.

use serde::{Deserialize, Serialize};

use crate::log::Snapshot;

/// Unit categories the remote schema knows about, in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Real power.
    Watts,
    /// Current.
    Amps,
    /// Power factor.
    #[serde(rename = "PF")]
    Pf,
    /// Apparent power.
    #[serde(rename = "VA")]
    Va,
    /// Reactive power.
    #[serde(rename = "VAR")]
    Var,
    /// Voltage.
    Volts,
    /// Line frequency.
    Hz,
}

impl Unit {
    /// Number of unit categories.
    pub const COUNT: usize = 7;

    /// All categories in canonical column order.
    pub const ALL: [Unit; Unit::COUNT] = [
        Unit::Watts,
        Unit::Amps,
        Unit::Pf,
        Unit::Va,
        Unit::Var,
        Unit::Volts,
        Unit::Hz,
    ];

    /// Position of this category in the canonical column order.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Column name used in the CSV header and the remote table.
    pub fn column(self) -> &'static str {
        match self {
            Unit::Watts => "Watts",
            Unit::Amps => "Amps",
            Unit::Pf => "PF",
            Unit::Va => "VA",
            Unit::Var => "VAR",
            Unit::Volts => "Volts",
            Unit::Hz => "Hz",
        }
    }
}

/// A named, unit-tagged value computed from a pair of log snapshots.
///
/// `evaluate` returns NaN to mean "nothing to report this tick" — the
/// encoder skips the value without writing a column. NaN is a data signal
/// here, not an error.
pub trait Measurement {
    /// Sensor identity this measurement reports under.
    fn name(&self) -> &str;

    /// Unit category, which selects the output column.
    fn unit(&self) -> Unit;

    /// Number of fractional digits to emit.
    fn precision(&self) -> usize;

    /// Computes the value for the interval spanned by the two snapshots.
    fn evaluate(&self, older: &Snapshot, newer: &Snapshot) -> f64;
}

/// Sorts measurements by name, then unit ordinal.
///
/// Run once at configuration time so that same-named measurements are
/// contiguous (they share an output row) and unit columns are filled in
/// canonical order.
pub fn sort_measurements(measurements: &mut [Box<dyn Measurement>]) {
    measurements.sort_by(|a, b| {
        a.name()
            .cmp(b.name())
            .then(a.unit().ordinal().cmp(&b.unit().ordinal()))
    });
}

/// Returns the (sensor, unit) pairs that occur more than once.
///
/// The remote schema has one column per unit, so a duplicate can never be
/// emitted; the encoder drops the later value. Callers surface this at
/// configuration time.
pub fn duplicate_units(measurements: &[Box<dyn Measurement>]) -> Vec<(String, Unit)> {
    let mut duplicates = Vec::new();
    for pair in measurements.windows(2) {
        if pair[0].name() == pair[1].name() && pair[0].unit() == pair[1].unit() {
            let key = (pair[0].name().to_string(), pair[0].unit());
            if !duplicates.contains(&key) {
                duplicates.push(key);
            }
        }
    }
    duplicates
}

/// The subset of unit categories that appear in output at all.
///
/// Fixes the CSV header and the value-column width of every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUnits {
    active: [bool; Unit::COUNT],
}

impl ActiveUnits {
    /// Derives the active set from a measurement list.
    pub fn from_measurements(measurements: &[Box<dyn Measurement>]) -> Self {
        let mut active = [false; Unit::COUNT];
        for m in measurements {
            active[m.unit().ordinal()] = true;
        }
        Self { active }
    }

    /// Whether the category at `ordinal` is active.
    pub fn is_active(&self, ordinal: usize) -> bool {
        self.active.get(ordinal).copied().unwrap_or(false)
    }

    /// Number of active categories — the value-column width of every row.
    pub fn len(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Whether no category is active.
    pub fn is_empty(&self) -> bool {
        !self.active.iter().any(|&a| a)
    }

    /// Active categories in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = Unit> + '_ {
        Unit::ALL
            .into_iter()
            .filter(|u| self.active[u.ordinal()])
    }

    /// CSV header row: the fixed prefix plus one column per active unit.
    pub fn csv_header(&self) -> String {
        let mut header = String::from("timestamp,device,sensor");
        for unit in self.iter() {
            header.push(',');
            header.push_str(unit.column());
        }
        header
    }
}

/// Measurement reporting the rate of change of one log channel.
///
/// Accumulator channels hold cumulative quantities (watt-hours, amp-hours),
/// so the per-interval rate is the channel delta divided by elapsed logging
/// hours. Reports NaN when no time elapsed or the channel is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRate {
    /// Sensor identity.
    pub name: String,
    /// Output unit category.
    pub unit: Unit,
    /// Index of the accumulator channel in the log snapshots.
    pub channel: usize,
    /// Fractional digits to emit.
    #[serde(default = "default_precision")]
    pub precision: usize,
}

fn default_precision() -> usize {
    1
}

impl Measurement for ChannelRate {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> Unit {
        self.unit
    }

    fn precision(&self) -> usize {
        self.precision
    }

    fn evaluate(&self, older: &Snapshot, newer: &Snapshot) -> f64 {
        let elapsed_hours = newer.log_hours - older.log_hours;
        if elapsed_hours <= 0.0 {
            return f64::NAN;
        }
        match (older.channels.get(self.channel), newer.channels.get(self.channel)) {
            (Some(a), Some(b)) => (b - a) / elapsed_hours,
            _ => f64::NAN,
        }
    }
}
