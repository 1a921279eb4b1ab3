//! Row-batching CSV encoder.
//!
//! Consumes ordered measurements for one interval tick and appends
//! fixed-schema CSV rows to a bounded [`Batch`]. Output is denormalized:
//! one row per (timestamp, sensor) pair with a dense set of unit columns,
//! `NULL` where a sensor has no value for an active unit.
//!
//! The encoder is purely a text producer. It knows nothing about transport
//! or retry; the scheduler decides when a batch is sealed and posted.
//!
//! # Batch framing
//!
//! The header is written once, when the batch is empty. Every data row is
//! preceded by `\n`; a single trailing `\n` is appended when the body is
//! taken for POST. Re-encoding the same window therefore reproduces the
//! batch byte for byte.

use crate::log::Snapshot;
use crate::measurement::{ActiveUnits, Measurement, Unit};
use crate::timestamp;

/// Growable text buffer holding the CSV header plus zero or more rows.
///
/// Bounded by the configured capacity: [`Batch::is_full`] reports when
/// encoding must stop. The buffer survives CPU-budget yields and is cleared
/// when the body is taken for a POST attempt.
#[derive(Debug)]
pub struct Batch {
    buf: String,
    limit: usize,
    rows: usize,
}

impl Batch {
    /// Creates an empty batch bounded at `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            rows: 0,
        }
    }

    /// Whether nothing has been written yet, not even the header.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether the buffer has reached its capacity.
    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.limit
    }

    /// Number of data rows appended so far.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Current size in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// The accumulated text, without the trailing newline.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Discards all accumulated text.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.rows = 0;
    }

    /// Seals the batch for POST: appends the trailing newline and returns
    /// the body, leaving the batch empty.
    pub fn take_body(&mut self) -> String {
        self.buf.push('\n');
        self.rows = 0;
        std::mem::take(&mut self.buf)
    }

    fn ensure_header(&mut self, header: &str) {
        if self.buf.is_empty() {
            self.buf.push_str(header);
        }
    }
}

/// Serializes sorted measurements for one tick into fixed-width CSV rows.
#[derive(Debug)]
pub struct RowEncoder {
    device: String,
    header: String,
    active: ActiveUnits,
}

impl RowEncoder {
    /// Builds an encoder for a sorted measurement list.
    ///
    /// The measurement list must already be ordered by (name, unit ordinal);
    /// see [`crate::measurement::sort_measurements`].
    pub fn new(measurements: &[Box<dyn Measurement>], device: String) -> Self {
        let active = ActiveUnits::from_measurements(measurements);
        let header = active.csv_header();
        Self {
            device,
            header,
            active,
        }
    }

    /// The CSV header row this encoder emits.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// The active unit set fixing the row width.
    pub fn active_units(&self) -> &ActiveUnits {
        &self.active
    }

    /// Encodes one interval tick into `batch`.
    ///
    /// The row timestamp is `older.time`. A measurement evaluating to NaN is
    /// skipped entirely: no column is written and the unit cursor does not
    /// advance. A change of sensor name closes the current row (NULL-filling
    /// the remaining active columns) and opens a new one. A repeated unit
    /// ordinal for the same sensor is ignored; the schema has one column per
    /// unit.
    pub fn encode_tick(
        &self,
        measurements: &[Box<dyn Measurement>],
        older: &Snapshot,
        newer: &Snapshot,
        batch: &mut Batch,
    ) {
        let Some(first) = measurements.first() else {
            return;
        };

        batch.ensure_header(&self.header);

        let stamp = timestamp::format(older.time);
        let mut sensor = first.name();
        self.open_row(batch, &stamp, sensor);
        let mut unit_index = 0usize;

        for m in measurements {
            let value = m.evaluate(older, newer);
            if value.is_nan() {
                continue;
            }

            if m.name() != sensor {
                self.null_fill(batch, &mut unit_index, Unit::COUNT);
                sensor = m.name();
                self.open_row(batch, &stamp, sensor);
                unit_index = 0;
            }

            self.null_fill(batch, &mut unit_index, m.unit().ordinal());

            // A duplicate ordinal means the cursor already moved past this
            // column; the later value is dropped.
            if unit_index == m.unit().ordinal() {
                batch
                    .buf
                    .push_str(&format!(",{value:.prec$}", prec = m.precision()));
                unit_index += 1;
            }
        }

        self.null_fill(batch, &mut unit_index, Unit::COUNT);
    }

    fn open_row(&self, batch: &mut Batch, stamp: &str, sensor: &str) {
        batch
            .buf
            .push_str(&format!("\n{stamp},{},{sensor}", self.device));
        batch.rows += 1;
    }

    /// Writes `,NULL` for every active unit in `current..target`, advancing
    /// the cursor over inactive ordinals as well.
    fn null_fill(&self, batch: &mut Batch, current: &mut usize, target: usize) {
        while *current < target {
            if self.active.is_active(*current) {
                batch.buf.push_str(",NULL");
            }
            *current += 1;
        }
    }
}
