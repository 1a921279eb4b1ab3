//! Non-blocking HTTP transport abstraction.
//!
//! The scheduler never blocks: it submits a request, then polls for a
//! terminal ready state on subsequent ticks. On the device the transport is
//! the firmware's async HTTP client; this crate only owns the seam. The
//! trait keeps the two failure classes the scheduler cares about distinct:
//! a response with a status code, and a request that never reached a
//! terminal state at all.
//!
//! [`HttpTransport`] (behind the `http-transport` feature) is a hosted
//! implementation that runs each request on a worker thread via a blocking
//! reqwest client, so `poll` stays non-blocking.

use crate::error::Result;

/// HTTP method of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read-only query.
    Get,
    /// Batch upload.
    Post,
}

/// A request the uploader wants issued against the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Path plus query string, relative to the transport's base URL.
    pub path: String,
    /// Content type for the body, if any.
    pub content_type: Option<String>,
    /// Additional headers.
    pub headers: Vec<(String, String)>,
    /// Request body. Empty for GET.
    pub body: String,
}

impl Request {
    /// Creates a GET request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            content_type: None,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Creates a POST request for `path` carrying `body`.
    pub fn post(path: impl Into<String>, content_type: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            content_type: Some(content_type.into()),
            headers: Vec::new(),
            body,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Terminal outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The request reached the remote and a status line came back.
    Response {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },
    /// The request never reached a terminal ready state (connection drop,
    /// timeout, worker failure).
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Result of polling an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPoll {
    /// Still in flight; check back next tick.
    Pending,
    /// Terminal state reached. Consuming this leaves the transport idle.
    Ready(Completion),
}

/// Seam between the scheduler and the HTTP stack.
///
/// Implementations carry at most one in-flight request. `submit` while a
/// request is in flight is a caller bug and fails with
/// [`crate::error::TransportError::Busy`].
pub trait Transport {
    /// Whether the network link is currently usable. The scheduler defers
    /// work (rather than erroring) while this is false.
    fn is_connected(&self) -> bool;

    /// Starts a request. Must return promptly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TransportError::Busy`] if a request is
    /// already in flight.
    fn submit(&mut self, request: Request) -> Result<()>;

    /// Polls the in-flight request. Must return promptly. Returns
    /// [`RequestPoll::Pending`] when idle or still in flight.
    fn poll(&mut self) -> RequestPoll;
}

#[cfg(feature = "http-transport")]
pub use http::HttpTransport;

#[cfg(feature = "http-transport")]
mod http {
    use std::sync::mpsc::{Receiver, TryRecvError, channel};
    use std::time::Duration;

    use super::{Completion, Method, Request, RequestPoll, Transport};
    use crate::error::{Result, TransportError};

    /// Hosted [`Transport`] backed by a blocking reqwest client on a worker
    /// thread.
    ///
    /// Submit spawns a worker that runs the request to completion and posts
    /// the outcome on a channel; poll drains the channel without blocking.
    /// Links are assumed up on hosts, so `is_connected` is always true.
    #[derive(Debug)]
    pub struct HttpTransport {
        base_url: String,
        client: reqwest::blocking::Client,
        in_flight: Option<Receiver<Completion>>,
    }

    impl HttpTransport {
        /// Creates a transport for `base_url` with the given request
        /// timeout.
        ///
        /// # Errors
        ///
        /// Returns [`TransportError::ClientCreate`] if the underlying client
        /// cannot be constructed.
        pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| TransportError::ClientCreate { source: e })?;
            Ok(Self {
                base_url: base_url.into(),
                client,
                in_flight: None,
            })
        }

        fn execute(client: &reqwest::blocking::Client, url: String, request: Request) -> Completion {
            let mut builder = match request.method {
                Method::Get => client.get(&url),
                Method::Post => client.post(&url),
            };

            if let Some(content_type) = &request.content_type {
                builder = builder.header("Content-Type", content_type.as_str());
            }
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            match builder.body(request.body).send() {
                Ok(response) => Completion::Response {
                    status: response.status().as_u16(),
                    body: response.text().unwrap_or_default(),
                },
                Err(e) => Completion::Failed {
                    reason: e.to_string(),
                },
            }
        }
    }

    impl Transport for HttpTransport {
        fn is_connected(&self) -> bool {
            true
        }

        fn submit(&mut self, request: Request) -> Result<()> {
            if self.in_flight.is_some() {
                return Err(TransportError::Busy.into());
            }

            let (tx, rx) = channel();
            let client = self.client.clone();
            let url = format!("{}{}", self.base_url, request.path);
            std::thread::spawn(move || {
                // The receiver may have been dropped on stop; nothing to do.
                let _ = tx.send(Self::execute(&client, url, request));
            });
            self.in_flight = Some(rx);
            Ok(())
        }

        fn poll(&mut self) -> RequestPoll {
            let Some(rx) = &self.in_flight else {
                return RequestPoll::Pending;
            };

            match rx.try_recv() {
                Ok(completion) => {
                    self.in_flight = None;
                    RequestPoll::Ready(completion)
                }
                Err(TryRecvError::Empty) => RequestPoll::Pending,
                Err(TryRecvError::Disconnected) => {
                    self.in_flight = None;
                    RequestPoll::Ready(Completion::Failed {
                        reason: "transport worker exited without a result".to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let get = Request::get("/readings?limit=1");
        assert_eq!(get.method, Method::Get);
        assert!(get.content_type.is_none());
        assert!(get.body.is_empty());

        let post = Request::post("/readings", "text/csv", "a,b\n".to_string())
            .with_header("Prefer", "return=minimal")
            .with_header("Authorization", "Bearer tok");
        assert_eq!(post.method, Method::Post);
        assert_eq!(post.content_type.as_deref(), Some("text/csv"));
        assert_eq!(post.headers.len(), 2);
        assert_eq!(post.headers[0], ("Prefer".to_string(), "return=minimal".to_string()));
    }

    #[cfg(feature = "http-transport")]
    #[test]
    fn test_http_transport_reports_connection_failure() {
        use std::time::Duration;

        // Nothing listens on port 9; the request must reach a terminal
        // Failed state rather than hanging.
        let mut transport =
            HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        transport.submit(Request::get("/readings")).unwrap();

        assert!(matches!(
            transport.submit(Request::get("/again")),
            Err(crate::error::WattpostError::Transport(
                crate::error::TransportError::Busy
            ))
        ));

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            match transport.poll() {
                RequestPoll::Ready(Completion::Failed { .. }) => break,
                RequestPoll::Ready(other) => panic!("unexpected completion: {other:?}"),
                RequestPoll::Pending => {
                    assert!(std::time::Instant::now() < deadline, "request never completed");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        // Transport is idle again.
        assert_eq!(transport.poll(), RequestPoll::Pending);
    }
}
