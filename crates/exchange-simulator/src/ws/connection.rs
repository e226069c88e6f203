//! Cancellable message transport over tokio-tungstenite streams.

use super::message::Message;
use crate::error::{Result, SimulatorError};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message as Frame};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A message-oriented, full-duplex connection.
///
/// `read` and `write` may be called concurrently from different tasks; calls of
/// the same kind are serialized.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn read(&self, cancel: &CancellationToken) -> Result<Message>;

    async fn write(&self, cancel: &CancellationToken, message: &Message) -> Result<()>;

    async fn close(&self);
}

/// Connection dialed to the upstream server.
pub type UpstreamConnection = WsConnection<MaybeTlsStream<TcpStream>>;

pub struct WsConnection<S> {
    peer: &'static str,
    sink: Mutex<SplitSink<WebSocketStream<S>, Frame>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// `peer` names the remote side in logs (`client` or `upstream`).
    pub fn new(peer: &'static str, socket: WebSocketStream<S>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

fn map_ws_error(err: tungstenite::Error) -> SimulatorError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            SimulatorError::ConnectionClosed
        }
        other => SimulatorError::WebSocket(other),
    }
}

#[async_trait]
impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&self, cancel: &CancellationToken) -> Result<Message> {
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(SimulatorError::Cancelled),
            stream = self.stream.lock() => stream,
        };

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(SimulatorError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                None | Some(Ok(Frame::Close(_))) => return Err(SimulatorError::ConnectionClosed),
                Some(Err(e)) => return Err(map_ws_error(e)),
                Some(Ok(frame)) => {
                    // pings are answered by tungstenite itself
                    if let Some(message) = Message::from_frame(frame) {
                        debug!(
                            peer = self.peer,
                            r#type = %message.message_type,
                            data = %message.hex_data(),
                            "WebSocket message received"
                        );
                        return Ok(message);
                    }
                }
            }
        }
    }

    async fn write(&self, cancel: &CancellationToken, message: &Message) -> Result<()> {
        let frame = message.clone().into_frame()?;
        let mut sink = tokio::select! {
            _ = cancel.cancelled() => return Err(SimulatorError::Cancelled),
            sink = self.sink.lock() => sink,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(SimulatorError::Cancelled),
            sent = sink.send(frame) => sent.map_err(map_ws_error)?,
        }

        debug!(
            peer = self.peer,
            r#type = %message.message_type,
            data = %message.hex_data(),
            "WebSocket message sent"
        );
        Ok(())
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(peer = self.peer, error = %e, "WebSocket close failed");
        }
    }
}

/// Opens a WebSocket connection to `url`.
pub async fn dial(url: &str) -> Result<UpstreamConnection> {
    let (socket, response) = connect_async(url).await.map_err(map_ws_error)?;
    debug!(url, status = %response.status(), "Upstream WebSocket connected");
    Ok(WsConnection::new("upstream", socket))
}
