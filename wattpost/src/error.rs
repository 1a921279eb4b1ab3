//! Error types for the wattpost uploader.

use thiserror::Error;

/// The main error type for all wattpost operations.
///
/// Runtime upload failures (a dropped connection, a rejected POST) are not
/// errors — the scheduler degrades them to bounded retries and keeps the
/// latest status message observable. This enum covers the conditions that
/// are actually fatal to constructing or wiring up an uploader.
#[derive(Error, Debug)]
pub enum WattpostError {
    /// Error validating or loading configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error setting up or driving the HTTP transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors that can occur when loading or validating an upload configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The target table name is missing or empty.
    #[error("table name required")]
    MissingTable,

    /// The upload interval is invalid.
    #[error("invalid interval: {seconds}s (must be > 0)")]
    InvalidInterval {
        /// The rejected interval, in seconds.
        seconds: u32,
    },

    /// The bulk-send multiplier is invalid.
    #[error("invalid bulk-send multiplier: {count} (must be >= 1)")]
    InvalidBulkSend {
        /// The rejected multiplier.
        count: u32,
    },

    /// The output buffer capacity is invalid.
    #[error("invalid buffer limit: {bytes} bytes (must be > 0)")]
    InvalidBufferLimit {
        /// The rejected capacity.
        bytes: usize,
    },

    /// No output measurements were supplied to the uploader.
    #[error("at least one output measurement is required")]
    NoOutputs,

    /// The configuration file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// The path that could not be read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration text could not be parsed.
    #[error("failed to parse config: {source}")]
    Parse {
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur when driving the HTTP transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A request was submitted while another is still in flight.
    #[error("a request is already in flight")]
    Busy,

    /// Failed to create the HTTP client.
    #[cfg(feature = "http-transport")]
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// Type alias for `Result<T, WattpostError>`.
pub type Result<T> = std::result::Result<T, WattpostError>;
