//! Upload scheduler: the cooperative state machine driving resolution,
//! encoding, and posting.
//!
//! One tick is one invocation of [`Uploader::tick`]; it never blocks and
//! returns the delay until it wants to run again. Every operation either
//! completes synchronously or starts an asynchronous transport request that
//! is polled on later ticks. The CPU-budget check inside the encoding loop
//! is the only voluntary yield inside otherwise synchronous work; the batch
//! buffer and the log read head survive the yield.
//!
//! # States
//!
//! ```text
//! Resolving ──► AwaitingResolve ──► Encoding ──► Posting ──► AwaitingPost
//!     ▲                │               ▲                          │
//!     └──── retry 5s ──┘               └──────── retry 10s ───────┘
//!                                                  (201: advance cursor)
//! ```
//!
//! `last_sent` advances only when the remote answers 201 for the batch
//! containing that timestamp. A failed POST leaves the cursor unchanged, so
//! the same window is re-encoded and re-sent — duplicates are possible,
//! gaps are not.

use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::UploadConfig;
use crate::encoder::{Batch, RowEncoder};
use crate::error::{ConfigError, Result};
use crate::log::{LogStore, Snapshot};
use crate::measurement::{Measurement, duplicate_units, sort_measurements};
use crate::resume::{self, ResumeCursor};
use crate::timestamp;
use crate::transport::{Completion, Request, RequestPoll, Transport};

/// States of the upload state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Waiting for connectivity, then issuing the resume-point query.
    Resolving,
    /// Resume-point query in flight.
    AwaitingResolve,
    /// Filling the batch from the log store.
    Encoding,
    /// Submitting the sealed batch.
    Posting,
    /// Batch POST in flight.
    AwaitingPost,
    /// Terminal: resources released, nothing further happens.
    Stopped,
}

/// Yield delay after submitting a request or exhausting the CPU budget.
const YIELD_DELAY: Duration = Duration::from_millis(10);

/// Delay while waiting for connectivity or for the log to fill a window.
const IDLE_DELAY: Duration = Duration::from_secs(1);

/// Delay after a window produced no rows at all.
const EMPTY_WINDOW_DELAY: Duration = Duration::from_secs(5);

/// Backoff after a failed resume-point query. Reads are cheap to retry.
const QUERY_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Backoff after a failed POST. Large writes retry less aggressively.
const POST_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Longest response-body excerpt kept in the status message.
const STATUS_BODY_LIMIT: usize = 200;

/// Cooperative uploader for one PostgREST target.
///
/// Owns its cursor, batch, and in-flight request exclusively; the log store
/// is an injected read-only dependency. At most one request is in flight at
/// a time.
pub struct Uploader<L, T, C = SystemClock> {
    config: UploadConfig,
    device: String,
    measurements: Vec<Box<dyn Measurement>>,
    encoder: RowEncoder,
    log: L,
    transport: T,
    clock: C,
    state: UploadState,
    cursor: ResumeCursor,
    batch: Batch,
    /// Snapshot at the next unencoded row's timestamp. Survives CPU-budget
    /// yields so the encoding loop resumes without re-reading the log.
    read_head: Option<Snapshot>,
    status: Option<String>,
    stop_requested: bool,
}

impl<L: LogStore, T: Transport> Uploader<L, T, SystemClock> {
    /// Creates an uploader with the system clock.
    ///
    /// Measurements are sorted once by (name, unit ordinal); duplicate
    /// (sensor, unit) pairs are reported via `tracing::warn!` here because
    /// the encoder will silently drop their later values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the
    /// measurement list is empty.
    pub fn new(
        config: UploadConfig,
        device_identity: &str,
        measurements: Vec<Box<dyn Measurement>>,
        log: L,
        transport: T,
    ) -> Result<Self> {
        Self::with_clock(
            config,
            device_identity,
            measurements,
            log,
            transport,
            SystemClock::new(),
        )
    }
}

impl<L: LogStore, T: Transport, C: Clock> Uploader<L, T, C> {
    /// Creates an uploader with an injected clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the
    /// measurement list is empty.
    pub fn with_clock(
        config: UploadConfig,
        device_identity: &str,
        mut measurements: Vec<Box<dyn Measurement>>,
        log: L,
        transport: T,
        clock: C,
    ) -> Result<Self> {
        config.validate()?;
        if measurements.is_empty() {
            return Err(ConfigError::NoOutputs.into());
        }

        sort_measurements(&mut measurements);
        for (sensor, unit) in duplicate_units(&measurements) {
            tracing::warn!(
                sensor = %sensor,
                unit = unit.column(),
                "duplicate unit for sensor; later values will be ignored"
            );
        }

        let device = config.resolve_device_name(device_identity);
        let encoder = RowEncoder::new(&measurements, device.clone());
        let batch = Batch::new(config.buffer_limit);

        tracing::info!(
            table = %config.table,
            schema = %config.effective_schema(),
            device = %device,
            auth = config.jwt_token.is_some(),
            "configured PostgREST upload"
        );

        Ok(Self {
            config,
            device,
            measurements,
            encoder,
            log,
            transport,
            clock,
            state: UploadState::Resolving,
            cursor: ResumeCursor::default(),
            batch,
            read_head: None,
            status: None,
            stop_requested: false,
        })
    }

    /// Runs one cooperative tick and returns the delay until the next one.
    ///
    /// A [`UploadState::Stopped`] uploader returns `Duration::MAX`.
    pub fn tick(&mut self) -> Duration {
        match self.state {
            UploadState::Resolving => self.handle_resolving(),
            UploadState::AwaitingResolve => self.handle_awaiting_resolve(),
            UploadState::Encoding => self.handle_encoding(),
            UploadState::Posting => self.handle_posting(),
            UploadState::AwaitingPost => self.handle_awaiting_post(),
            UploadState::Stopped => Duration::MAX,
        }
    }

    /// Current state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Current resume cursor.
    pub fn cursor(&self) -> ResumeCursor {
        self.cursor
    }

    /// Latest human-readable failure status, if the most recent query or
    /// POST did not succeed.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Resolved device name used in rows and queries.
    pub fn device_name(&self) -> &str {
        &self.device
    }

    /// CSV header the encoder emits for this measurement set.
    pub fn csv_header(&self) -> &str {
        self.encoder.header()
    }

    /// Requests a cooperative stop.
    ///
    /// The state machine honors this at the next state boundary. An
    /// in-flight request is not interrupted; its completion is observed and
    /// discarded.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    fn handle_resolving(&mut self) -> Duration {
        if self.stop_requested {
            return self.stop();
        }
        if !self.transport.is_connected() {
            return IDLE_DELAY;
        }

        let request = self.authorized(Request::get(resume::query_path(&self.config, &self.device)));
        match self.transport.submit(request) {
            Ok(()) => {
                self.state = UploadState::AwaitingResolve;
                YIELD_DELAY
            }
            Err(e) => {
                self.status = Some(format!("Query failed: {e}"));
                QUERY_RETRY_DELAY
            }
        }
    }

    fn handle_awaiting_resolve(&mut self) -> Duration {
        match self.transport.poll() {
            RequestPoll::Pending => YIELD_DELAY,
            RequestPoll::Ready(Completion::Response { status: 200, body }) => {
                let remote = resume::latest_remote_timestamp(&body);
                self.cursor.last_sent = resume::reconcile(
                    remote,
                    self.config.start_date,
                    self.log.first_key(),
                    self.config.interval,
                );
                self.status = None;
                if !self.stop_requested {
                    tracing::info!(
                        start = %timestamp::format(self.cursor.last_sent + self.config.interval),
                        "start posting"
                    );
                }
                self.state = UploadState::Encoding;
                YIELD_DELAY
            }
            RequestPoll::Ready(Completion::Response { status, body }) => {
                self.fail_query(format!(
                    "Query failed, code {status}: {}",
                    truncated(&body)
                ))
            }
            RequestPoll::Ready(Completion::Failed { reason }) => {
                self.fail_query(format!("Query failed: {reason}"))
            }
        }
    }

    fn fail_query(&mut self, message: String) -> Duration {
        tracing::warn!(%message, "resume query failed");
        self.status = Some(message);
        self.state = UploadState::Resolving;
        QUERY_RETRY_DELAY
    }

    fn handle_encoding(&mut self) -> Duration {
        if self.stop_requested {
            return self.stop();
        }

        let interval = u64::from(self.config.interval);
        let window_last =
            u64::from(self.cursor.last_sent) + interval * u64::from(self.config.bulk_send);

        // Wait until the log holds the full bulk window: the last row needs
        // its closing snapshot one interval past the window.
        if u64::from(self.log.last_key()) < window_last + interval {
            self.read_head = None;
            return IDLE_DELAY;
        }

        let mut head = self.read_head.take().unwrap_or_else(|| {
            self.log
                .read_at(self.cursor.last_sent + self.config.interval)
        });

        let deadline = self.clock.elapsed() + self.config.cpu_budget;

        while !self.batch.is_full() && u64::from(head.time) <= window_last {
            if self.clock.elapsed() > deadline {
                // Budget spent; park the read head and resume next tick.
                self.read_head = Some(head);
                return YIELD_DELAY;
            }

            let newer = self.log.read_at(head.time + self.config.interval);
            let older = std::mem::replace(&mut head, newer);

            // A tick spanning zero logged hours has nothing to report.
            if (head.log_hours - older.log_hours) != 0.0 {
                self.encoder
                    .encode_tick(&self.measurements, &older, &head, &mut self.batch);
                self.cursor.last_post = older.time;
            }
        }

        if self.batch.row_count() == 0 {
            self.batch.clear();
            return EMPTY_WINDOW_DELAY;
        }

        self.state = UploadState::Posting;
        YIELD_DELAY
    }

    fn handle_posting(&mut self) -> Duration {
        let rows = self.batch.row_count();
        let body = self.batch.take_body();
        tracing::debug!(rows, bytes = body.len(), "posting batch");

        let request = self.authorized(
            Request::post(self.config.endpoint_path(), "text/csv", body)
                .with_header("Prefer", "return=minimal"),
        );
        match self.transport.submit(request) {
            Ok(()) => {
                self.state = UploadState::AwaitingPost;
                YIELD_DELAY
            }
            Err(e) => self.fail_post(format!("POST failed: {e}")),
        }
    }

    fn handle_awaiting_post(&mut self) -> Duration {
        match self.transport.poll() {
            RequestPoll::Pending => YIELD_DELAY,
            // PostgREST acknowledges inserts with 201; anything else is a
            // failure even if another backend would call it success.
            RequestPoll::Ready(Completion::Response { status: 201, .. }) => {
                self.cursor.last_sent = self.cursor.last_post;
                self.status = None;
                tracing::debug!(last_sent = self.cursor.last_sent, "batch accepted");
                self.state = UploadState::Encoding;
                YIELD_DELAY
            }
            RequestPoll::Ready(Completion::Response { status, body }) => {
                self.fail_post(format!("POST failed, code {status}: {}", truncated(&body)))
            }
            RequestPoll::Ready(Completion::Failed { reason }) => {
                self.fail_post(format!("POST failed: {reason}"))
            }
        }
    }

    fn fail_post(&mut self, message: String) -> Duration {
        tracing::warn!(%message, "batch upload failed");
        self.status = Some(message);
        // Cursor unchanged: the same window is re-encoded and re-sent.
        self.state = UploadState::Encoding;
        POST_RETRY_DELAY
    }

    fn stop(&mut self) -> Duration {
        self.batch.clear();
        self.read_head = None;
        self.state = UploadState::Stopped;
        tracing::info!("uploader stopped");
        Duration::MAX
    }

    fn authorized(&self, request: Request) -> Request {
        match &self.config.jwt_token {
            Some(token) => request.with_header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

/// Caps a response-body excerpt for the status message.
fn truncated(body: &str) -> &str {
    match body.char_indices().nth(STATUS_BODY_LIMIT) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
