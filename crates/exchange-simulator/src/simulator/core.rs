//! Simulator engine: routing, HTTP dispatch and upstream dialing.

use crate::config::{Config, WsConfig};
use crate::error::{Result, SimulatorError};
use crate::http::{build_http_client, HttpRuleSet, Request, Response};
use crate::metrics;
use crate::timing::deadline;
use crate::ws::{dial, Connection, WsRuleSet};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Body of the 404 returned for paths outside the HTTP base path.
pub const INVALID_ENDPOINT: &str = "Invalid endpoint";
/// Body of the 404 returned when no HTTP rule matches.
pub const INVALID_REQUEST: &str = "Invalid request";
/// Text sent back when no WebSocket rule matches.
pub const INVALID_MESSAGE: &str = "Invalid message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Http,
    WebSocket,
}

/// Immutable rule engine shared by every connection.
#[derive(Debug)]
pub struct Simulator {
    http: Option<HttpRuleSet>,
    ws: Option<WsRuleSet>,
}

impl Simulator {
    pub fn new(http: Option<HttpRuleSet>, ws: Option<WsRuleSet>) -> Self {
        Self { http, ws }
    }

    /// Compiles every configured rule. Invalid patterns or hex payloads fail here.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = match &config.http {
            Some(http) => Some(http.build(&build_http_client()?)),
            None => None,
        };
        let ws = config.ws.as_ref().map(WsConfig::build).transpose()?;

        info!(
            http_rules = http.as_ref().map_or(0, HttpRuleSet::len),
            ws_rules = ws.as_ref().map_or(0, WsRuleSet::len),
            "Simulator rules loaded"
        );
        Ok(Self::new(http, ws))
    }

    pub fn http_rules(&self) -> Option<&HttpRuleSet> {
        self.http.as_ref()
    }

    pub fn ws_rules(&self) -> Option<&WsRuleSet> {
        self.ws.as_ref()
    }

    /// The WebSocket endpoint is matched exactly; everything else goes to HTTP
    /// dispatch, which reports paths outside the base path itself.
    pub fn route(&self, path: &str) -> Route {
        match &self.ws {
            Some(ws) if ws.endpoint() == path => Route::WebSocket,
            _ => Route::Http,
        }
    }

    /// Answers one HTTP request, no earlier than the matched rule's delay after
    /// the call started.
    pub async fn handle_http(&self, request: Request) -> Response {
        let start = Instant::now();

        let Some(rules) = &self.http else {
            metrics::record_http_request("no_route");
            return Response::new(404, INVALID_ENDPOINT);
        };
        let Some(request) = rules.strip_base_path(request) else {
            metrics::record_http_request("no_route");
            return Response::new(404, INVALID_ENDPOINT);
        };

        debug!(
            method = %request.method,
            path = %request.path,
            query = %request.query_string,
            "Received HTTP request"
        );

        let Some(rule) = rules.find_rule(&request) else {
            debug!(method = %request.method, path = %request.path, "No HTTP rule matched");
            metrics::record_http_request("no_rule");
            return Response::new(404, INVALID_REQUEST);
        };

        match rule.responder.respond(&request).await {
            Ok(timed) => {
                metrics::record_http_request("matched");
                metrics::record_http_delay(timed.delay.as_millis() as u64);
                tokio::time::sleep_until(deadline(start, timed.delay)).await;
                debug!(
                    path = %request.path,
                    status = timed.response.status_code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Completed HTTP request"
                );
                timed.response
            }
            Err(e) => {
                error!(path = %request.path, error = %e, "HTTP responder failed");
                metrics::record_http_request("error");
                error_body(&e)
            }
        }
    }

    /// Dials the configured upstream, if any.
    pub async fn connect_upstream(&self) -> Result<Option<Arc<dyn Connection>>> {
        let Some(url) = self.ws.as_ref().and_then(WsRuleSet::upstream_url) else {
            return Ok(None);
        };
        let upstream = dial(url).await?;
        info!(url, "Connected to upstream WebSocket server");
        Ok(Some(Arc::new(upstream)))
    }
}

/// `502` for failures of the real server behind a redirect, `500` otherwise.
fn error_body(err: &SimulatorError) -> Response {
    let status = if err.is_upstream() { 502 } else { 500 };
    let body = serde_json::json!({ "error": err.to_string() }).to_string();
    Response::new(status, body)
}
