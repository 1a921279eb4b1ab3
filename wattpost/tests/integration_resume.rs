//! Integration tests for resume-point resolution through the full machine.
//!
//! The resolver must never resume before local retention begins, never
//! before the configured start date, and never re-send anything the remote
//! already holds — and it must degrade every failure to a bounded retry.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use wattpost::clock::Clock;
use wattpost::config::UploadConfig;
use wattpost::error::Result;
use wattpost::log::{MemoryLog, Snapshot};
use wattpost::measurement::{ChannelRate, Measurement, Unit};
use wattpost::transport::{Completion, Request, RequestPoll, Transport};
use wattpost::uploader::{UploadState, Uploader};

// 2023-10-15T14:30:00Z
const T0: u32 = 1_697_380_200;

#[derive(Default)]
struct SharedTransport {
    completions: VecDeque<Completion>,
    requests: Vec<Request>,
    in_flight: bool,
}

#[derive(Clone, Default)]
struct MockTransport(Rc<RefCell<SharedTransport>>);

impl MockTransport {
    fn push(&self, completion: Completion) {
        self.0.borrow_mut().completions.push_back(completion);
    }

    fn request_count(&self) -> usize {
        self.0.borrow().requests.len()
    }
}

impl Transport for MockTransport {
    fn is_connected(&self) -> bool {
        true
    }

    fn submit(&mut self, request: Request) -> Result<()> {
        let mut shared = self.0.borrow_mut();
        shared.requests.push(request);
        shared.in_flight = true;
        Ok(())
    }

    fn poll(&mut self) -> RequestPoll {
        let mut shared = self.0.borrow_mut();
        if !shared.in_flight {
            return RequestPoll::Pending;
        }
        match shared.completions.pop_front() {
            Some(completion) => {
                shared.in_flight = false;
                RequestPoll::Ready(completion)
            }
            None => RequestPoll::Pending,
        }
    }
}

struct FrozenClock;

impl Clock for FrozenClock {
    fn elapsed(&self) -> Duration {
        Duration::ZERO
    }
}

fn measurements() -> Vec<Box<dyn Measurement>> {
    vec![Box::new(ChannelRate {
        name: "main".to_string(),
        unit: Unit::Watts,
        channel: 0,
        precision: 1,
    })]
}

fn log_from(start: u32, records: u32) -> MemoryLog {
    let mut log = MemoryLog::new();
    for i in 0..records {
        let hours = f64::from(i * 60) / 3600.0;
        log.push(Snapshot {
            time: start + i * 60,
            log_hours: hours,
            channels: vec![1000.0 * hours],
        });
    }
    log
}

fn uploader_with(
    config: UploadConfig,
    log: MemoryLog,
    transport: &MockTransport,
) -> Uploader<MemoryLog, MockTransport, FrozenClock> {
    Uploader::with_clock(
        config,
        "iw42",
        measurements(),
        log,
        transport.clone(),
        FrozenClock,
    )
    .unwrap()
}

fn config() -> UploadConfig {
    UploadConfig::from_json_str(r#"{"table": "readings", "interval": 60, "bulk_send": 5}"#)
        .unwrap()
}

#[test]
fn test_remote_timestamp_wins() {
    let transport = MockTransport::default();
    transport.push(Completion::Response {
        status: 200,
        body: r#"[{"timestamp": "2023-10-15T14:30:00Z"}]"#.to_string(),
    });

    // Retention starts well before the remote's newest row.
    let mut uploader = uploader_with(config(), log_from(T0 - 600, 20), &transport);
    uploader.tick();
    uploader.tick();

    assert_eq!(uploader.cursor().last_sent, T0);
}

#[test]
fn test_start_date_wins() {
    let transport = MockTransport::default();
    transport.push(Completion::Response {
        status: 200,
        body: r#"[{"timestamp": "2023-10-15T14:30:00Z"}]"#.to_string(),
    });

    let mut cfg = config();
    cfg.start_date = T0 + 120; // 14:32:00, interval-aligned
    let mut uploader = uploader_with(cfg, log_from(T0 - 600, 20), &transport);
    uploader.tick();
    uploader.tick();

    assert_eq!(uploader.cursor().last_sent, T0 + 120);
}

#[test]
fn test_retention_wins_over_stale_remote() {
    let transport = MockTransport::default();
    transport.push(Completion::Response {
        status: 200,
        // The remote last heard from us an hour before retention begins.
        body: r#"[{"timestamp": "2023-10-15T13:30:00Z"}]"#.to_string(),
    });

    let log = log_from(T0, 10);
    let mut uploader = uploader_with(config(), log, &transport);
    uploader.tick();
    uploader.tick();

    assert_eq!(uploader.cursor().last_sent, T0);
}

#[test]
fn test_resolved_cursor_is_interval_aligned() {
    let transport = MockTransport::default();
    transport.push(Completion::Response {
        status: 200,
        body: r#"[{"timestamp": "2023-10-15T14:30:25Z"}]"#.to_string(),
    });

    let mut uploader = uploader_with(config(), log_from(T0 - 600, 20), &transport);
    uploader.tick();
    uploader.tick();

    // 14:30:25 floors to 14:30:00.
    assert_eq!(uploader.cursor().last_sent, T0);
    assert_eq!(uploader.cursor().last_sent % 60, 0);
}

#[test]
fn test_malformed_response_falls_back_to_retention() {
    for body in ["<html>oops</html>", "[]", r#"[{"timestamp": "garbage"}]"#] {
        let transport = MockTransport::default();
        transport.push(Completion::Response {
            status: 200,
            body: body.to_string(),
        });

        let mut uploader = uploader_with(config(), log_from(T0, 10), &transport);
        uploader.tick();
        uploader.tick();

        // Not fatal: treated as "no resume data found".
        assert_eq!(uploader.state(), UploadState::Encoding);
        assert_eq!(uploader.cursor().last_sent, T0, "body: {body}");
    }
}

#[test]
fn test_failed_query_retries_then_succeeds() {
    let transport = MockTransport::default();
    transport.push(Completion::Response {
        status: 503,
        body: "unavailable".to_string(),
    });

    let mut uploader = uploader_with(config(), log_from(T0, 10), &transport);
    uploader.tick();

    let delay = uploader.tick();
    assert_eq!(delay, Duration::from_secs(5));
    assert_eq!(uploader.state(), UploadState::Resolving);
    assert_eq!(
        uploader.status(),
        Some("Query failed, code 503: unavailable")
    );

    // Second attempt succeeds and clears the status.
    transport.push(Completion::Response {
        status: 200,
        body: r#"[{"timestamp": "2023-10-15T14:30:00Z"}]"#.to_string(),
    });
    uploader.tick();
    uploader.tick();

    assert_eq!(uploader.state(), UploadState::Encoding);
    assert_eq!(uploader.cursor().last_sent, T0);
    assert!(uploader.status().is_none());
    assert_eq!(transport.request_count(), 2);
}

#[test]
fn test_query_transport_failure_is_distinguished() {
    let transport = MockTransport::default();
    transport.push(Completion::Failed {
        reason: "dns lookup failed".to_string(),
    });

    let mut uploader = uploader_with(config(), log_from(T0, 10), &transport);
    uploader.tick();

    let delay = uploader.tick();
    assert_eq!(delay, Duration::from_secs(5));
    assert_eq!(uploader.status(), Some("Query failed: dns lookup failed"));
    assert_eq!(uploader.state(), UploadState::Resolving);
}

#[test]
fn test_slow_query_stays_pending() {
    let transport = MockTransport::default();

    let mut uploader = uploader_with(config(), log_from(T0, 10), &transport);
    uploader.tick();
    assert_eq!(uploader.state(), UploadState::AwaitingResolve);

    // No completion scripted yet: the request is still in flight and the
    // machine keeps polling without giving up.
    for _ in 0..5 {
        let delay = uploader.tick();
        assert_eq!(uploader.state(), UploadState::AwaitingResolve);
        assert!(delay <= Duration::from_millis(10));
    }
}
