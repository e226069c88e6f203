//! hyper binding: HTTP/1.1 accept loop, WebSocket upgrade and metrics endpoint.

use super::core::{Route, Simulator};
use crate::http::{Request, Response};
use crate::metrics::collect_metrics;
use crate::ws::{Connection, WsConnection};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, CONNECTION, CONTENT_TYPE, HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type HyperResponse = hyper::Response<Full<Bytes>>;

/// JSON error body, for failures outside the rules.
pub fn error_response(status: StatusCode, message: &str) -> HyperResponse {
    let body = serde_json::json!({ "error": message }).to_string();
    let mut response = hyper::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn to_hyper_response(response: Response) -> HyperResponse {
    let status = match StatusCode::from_u16(response.status_code) {
        Ok(status) => status,
        Err(_) => {
            error!("Rule produced invalid status code {}", response.status_code);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("invalid status code {}", response.status_code),
            );
        }
    };
    let mut hyper_response = hyper::Response::new(Full::new(response.body));
    *hyper_response.status_mut() = status;
    hyper_response
}

/// Serves simulator traffic on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    simulator: Arc<Simulator>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(
        "Exchange simulator listening on http://{}",
        listener.local_addr()?
    );

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let simulator = Arc::clone(&simulator);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let simulator = Arc::clone(&simulator);
                                async move { handle_request(req, simulator).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .with_upgrades()
                                .await
                            {
                                debug!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("Exchange simulator shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn handle_request(
    req: hyper::Request<Incoming>,
    simulator: Arc<Simulator>,
) -> Result<HyperResponse, Infallible> {
    let response = match simulator.route(req.uri().path()) {
        Route::WebSocket => upgrade_websocket(req, simulator).await,
        Route::Http => handle_http_request(req, &simulator).await,
    };
    Ok(response)
}

async fn handle_http_request(req: hyper::Request<Incoming>, simulator: &Simulator) -> HyperResponse {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "Invalid body");
        }
    };

    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .unwrap_or_default()
        .to_string();

    let request = Request {
        method: parts.method.to_string(),
        host,
        path: parts.uri.path().to_string(),
        query_string: parts.uri.query().unwrap_or_default().to_string(),
        headers: parts.headers,
        body,
    };

    to_hyper_response(simulator.handle_http(request).await)
}

/// Returns the client key when `req` is a valid WebSocket handshake.
fn websocket_key(req: &hyper::Request<Incoming>) -> Option<&HeaderValue> {
    let headers = req.headers();
    let header_has = |name, token: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| {
                v.split(',')
                    .any(|part| part.trim().eq_ignore_ascii_case(token))
            })
    };

    if req.method() != Method::GET
        || !header_has(CONNECTION, "upgrade")
        || !header_has(UPGRADE, "websocket")
        || !header_has(SEC_WEBSOCKET_VERSION, "13")
    {
        return None;
    }
    headers.get(SEC_WEBSOCKET_KEY)
}

async fn upgrade_websocket(
    mut req: hyper::Request<Incoming>,
    simulator: Arc<Simulator>,
) -> HyperResponse {
    let Some(key) = websocket_key(&req) else {
        return error_response(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade");
    };
    let accept = derive_accept_key(key.as_bytes());

    // the upstream must be reachable before the client is told the upgrade succeeded
    let upstream = match simulator.connect_upstream().await {
        Ok(upstream) => upstream,
        Err(e) => {
            error!("Error connecting to WebSocket server: {}", e);
            return error_response(
                StatusCode::BAD_GATEWAY,
                "Failed to connect to WebSocket server",
            );
        }
    };

    let accept = match HeaderValue::from_str(&accept) {
        Ok(accept) => accept,
        Err(e) => {
            error!("Invalid WebSocket accept key: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "WebSocket upgrade failed");
        }
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let socket =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                let client: Arc<dyn Connection> = Arc::new(WsConnection::new("client", socket));
                // failures are logged by the session itself
                let _ = simulator.handle_ws_session(client, upstream).await;
            }
            Err(e) => {
                error!("WebSocket upgrade failed: {}", e);
                if let Some(upstream) = upstream {
                    upstream.close().await;
                }
            }
        }
    });

    let mut response = hyper::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    response
}

/// Serves `GET /metrics` in Prometheus text format until `shutdown` fires.
pub async fn serve_metrics(listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
    info!("Metrics listening on http://{}/metrics", listener.local_addr()?);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Metrics accept error: {}", e);
                        continue;
                    }
                };
                tokio::spawn(async move {
                    let service = service_fn(|req: hyper::Request<Incoming>| async move {
                        let response = if req.method() == Method::GET && req.uri().path() == "/metrics" {
                            let mut response = hyper::Response::new(Full::new(Bytes::from(collect_metrics())));
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                HeaderValue::from_static("text/plain; version=0.0.4"),
                            );
                            response
                        } else {
                            error_response(StatusCode::NOT_FOUND, "Not found")
                        };
                        Ok::<_, Infallible>(response)
                    });
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Metrics connection error: {}", e);
                    }
                });
            }
            _ = shutdown.cancelled() => break,
        }
    }
    Ok(())
}
