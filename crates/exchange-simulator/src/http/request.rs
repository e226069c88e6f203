//! Request/response snapshots exchanged between the transport and the rules.

use bytes::Bytes;
use hyper::HeaderMap;
use std::time::Duration;

/// Immutable snapshot of one inbound HTTP call.
///
/// Once routed, `path` no longer carries the configured base path.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub host: String,
    pub path: String,
    pub query_string: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = query_string.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub body: Bytes,
}

impl Response {
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }
}

/// A response together with the minimum latency the client must observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedResponse {
    pub response: Response,
    pub delay: Duration,
}

impl TimedResponse {
    pub fn new(response: Response, delay: Duration) -> Self {
        Self { response, delay }
    }

    pub fn immediate(response: Response) -> Self {
        Self::new(response, Duration::ZERO)
    }
}
