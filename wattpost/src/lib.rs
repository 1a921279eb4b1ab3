//! # wattpost
//!
//! Cooperative CSV uploader pushing embedded power-monitor logs to
//! PostgREST.
//!
//! wattpost periodically exports time-series measurements accumulated in a
//! local append-only log to a PostgreSQL/TimescaleDB table fronted by
//! PostgREST, resuming correctly after restarts without gaps or duplicate
//! rows. It is built for resource-constrained monitoring devices: nothing
//! ever blocks, work is paced by a per-tick CPU budget, and every failure
//! degrades to a bounded retry.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Single-threaded cooperative scheduling — one `tick()` per invocation,
//!   returning the delay until the next
//! - Gap-free, at-least-once delivery: the resume cursor only advances on a
//!   confirmed insert, and a failed POST re-encodes the same window byte
//!   for byte
//! - Fixed-schema CSV rows: one row per (timestamp, sensor), one column per
//!   active unit category, `NULL` for absent values
//! - Resume point recovered from the remote itself, reconciled with local
//!   retention and the configured start date
//! - Injected log store, transport, and clock — the full state machine runs
//!   in tests without a network or a real clock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "http-transport")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//! use wattpost::config::UploadConfig;
//! use wattpost::log::MemoryLog;
//! use wattpost::measurement::{ChannelRate, Measurement, Unit};
//! use wattpost::transport::HttpTransport;
//! use wattpost::uploader::Uploader;
//!
//! let config = UploadConfig::from_json_str(
//!     r#"{"table": "readings", "interval": 60, "bulk_send": 5}"#,
//! )?;
//!
//! let measurements: Vec<Box<dyn Measurement>> = vec![Box::new(ChannelRate {
//!     name: "main".to_string(),
//!     unit: Unit::Watts,
//!     channel: 0,
//!     precision: 1,
//! })];
//!
//! let log = MemoryLog::new(); // the device injects its flash-backed log
//! let transport = HttpTransport::new("http://db.local:3000", Duration::from_secs(30))?;
//!
//! let mut uploader = Uploader::new(config, "iw42", measurements, log, transport)?;
//! loop {
//!     let delay = uploader.tick();
//!     std::thread::sleep(delay);
//! }
//! # }
//! # #[cfg(not(feature = "http-transport"))]
//! # fn main() {}
//! ```
//!
//! ## Architecture
//!
//! - [`uploader::Uploader`] — top-level cooperative state machine
//! - [`encoder::RowEncoder`] — packs measurements into fixed-width CSV rows
//! - [`resume`] — resume-point query and reconciliation
//! - [`timestamp`] — lenient-in, canonical-out timestamp codec
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`uploader`] — state machine, tick loop, status reporting
//! - [`encoder`] — batch buffer and row encoding
//! - [`resume`] — resume cursor and remote reconciliation
//! - [`timestamp`] — timestamp parsing and formatting
//! - [`measurement`] — unit model and the measurement capability
//! - [`config`] — upload configuration
//! - [`log`] — log store trait and in-memory implementation
//! - [`transport`] — non-blocking transport trait (+ optional reqwest impl)
//! - [`clock`] — injected time source
//! - [`error`] — error types

pub mod clock;
pub mod config;
pub mod encoder;
pub mod error;
pub mod log;
pub mod measurement;
pub mod resume;
pub mod timestamp;
pub mod transport;
pub mod uploader;

// Re-export primary API types at crate root for convenience.
pub use config::UploadConfig;
pub use error::{Result, WattpostError};
pub use measurement::{Measurement, Unit};
pub use resume::ResumeCursor;
pub use uploader::{UploadState, Uploader};
