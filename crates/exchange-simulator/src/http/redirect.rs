//! HTTP redirect responder: forwards a request to a real server and optionally
//! records what it answered.

use super::request::{Request, Response, TimedResponse};
use super::responder::Responder;
use crate::error::{Result, SimulatorError};
use crate::recording::RecordDir;
use async_trait::async_trait;
use hyper::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use hyper::HeaderMap;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;
use url::Url;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client shared by every redirect responder.
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .map_err(|e| SimulatorError::InvalidConfig(format!("failed to create HTTP client: {e}")))
}

#[derive(Debug, Clone)]
pub struct RedirectResponder {
    target_url: String,
    recorder: Option<RecordDir>,
    client: reqwest::Client,
}

impl RedirectResponder {
    pub fn new(
        target_url: impl Into<String>,
        recorder: Option<RecordDir>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            recorder,
            client,
        }
    }

    fn target_for(&self, request: &Request) -> Result<Url> {
        let invalid = |reason: String| SimulatorError::InvalidTargetUrl {
            url: self.target_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.target_url).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }
        url.set_path(&request.path);
        if request.query_string.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&request.query_string));
        }
        Ok(url)
    }
}

/// Inbound headers minus the ones describing the inbound connection itself.
fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in [HOST, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING] {
        forwarded.remove(name);
    }
    forwarded
}

#[async_trait]
impl Responder for RedirectResponder {
    async fn respond(&self, request: &Request) -> Result<TimedResponse> {
        let url = self.target_for(request)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| SimulatorError::InvalidMethod(request.method.clone()))?;

        debug!(method = %method, url = %url, "Redirecting HTTP request");

        let upstream = self
            .client
            .request(method, url)
            .headers(forwarded_headers(&request.headers))
            .body(request.body.clone())
            .send()
            .await
            .map_err(SimulatorError::UpstreamUnreachable)?;

        let status_code = upstream.status().as_u16();
        let body = upstream
            .bytes()
            .await
            .map_err(SimulatorError::UpstreamRead)?;
        let response = Response::new(status_code, body);

        if let Some(recorder) = &self.recorder {
            recorder.record_response(&response).await?;
        }

        Ok(TimedResponse::immediate(response))
    }
}
