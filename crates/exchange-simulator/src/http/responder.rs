//! Canned HTTP responders.

use super::request::{Request, Response, TimedResponse};
use crate::error::Result;
use crate::recording::read_response_record;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Produces a response and the delay the client must observe before receiving it.
#[async_trait]
pub trait Responder: Send + Sync + fmt::Debug {
    async fn respond(&self, request: &Request) -> Result<TimedResponse>;
}

/// Fixed status and body.
#[derive(Debug, Clone)]
pub struct ResponseFromString {
    status_code: u16,
    body: Bytes,
    delay: Duration,
}

impl ResponseFromString {
    pub fn new(status_code: u16, body: impl Into<String>, delay: Duration) -> Self {
        Self {
            status_code,
            body: Bytes::from(body.into()),
            delay,
        }
    }
}

#[async_trait]
impl Responder for ResponseFromString {
    async fn respond(&self, _request: &Request) -> Result<TimedResponse> {
        Ok(TimedResponse::new(
            Response::new(self.status_code, self.body.clone()),
            self.delay,
        ))
    }
}

/// Response read from a record file on every call.
#[derive(Debug, Clone)]
pub struct ResponseFromFile {
    path: PathBuf,
    delay: Duration,
}

impl ResponseFromFile {
    pub fn new(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            path: path.into(),
            delay,
        }
    }
}

#[async_trait]
impl Responder for ResponseFromFile {
    async fn respond(&self, _request: &Request) -> Result<TimedResponse> {
        let response = read_response_record(&self.path).await?;
        Ok(TimedResponse::new(response, self.delay))
    }
}
