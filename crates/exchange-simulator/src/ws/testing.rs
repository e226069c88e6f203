//! In-memory [`Connection`] for unit tests.

use super::connection::Connection;
use super::message::Message;
use crate::error::{Result, SimulatorError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct MockConnection {
    inbound: Mutex<mpsc::UnboundedReceiver<Message>>,
    outbound: mpsc::UnboundedSender<(Instant, Message)>,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

/// The far end of a [`MockConnection`].
pub struct MockPeer {
    to_conn: mpsc::UnboundedSender<Message>,
    from_conn: mpsc::UnboundedReceiver<(Instant, Message)>,
}

pub fn mock_connection() -> (Arc<MockConnection>, MockPeer) {
    let (to_conn, inbound) = mpsc::unbounded_channel();
    let (outbound, from_conn) = mpsc::unbounded_channel();
    let conn = MockConnection {
        inbound: Mutex::new(inbound),
        outbound,
        fail_writes: AtomicBool::new(false),
        closed: AtomicBool::new(false),
    };
    (Arc::new(conn), MockPeer { to_conn, from_conn })
}

impl MockConnection {
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn read(&self, cancel: &CancellationToken) -> Result<Message> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(SimulatorError::Cancelled),
            message = inbound.recv() => message.ok_or(SimulatorError::ConnectionClosed),
        }
    }

    async fn write(&self, cancel: &CancellationToken, message: &Message) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(SimulatorError::Cancelled);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SimulatorError::ConnectionClosed);
        }
        self.outbound
            .send((Instant::now(), message.clone()))
            .map_err(|_| SimulatorError::ConnectionClosed)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MockPeer {
    /// Queues a message for the connection's next `read`.
    pub fn send(&self, message: Message) {
        let _ = self.to_conn.send(message);
    }

    /// Makes further reads on the connection fail with `ConnectionClosed`.
    pub fn hang_up(&mut self) {
        let (closed, _) = mpsc::unbounded_channel();
        self.to_conn = closed;
    }

    /// Next written message with its write time, or `None` after `timeout`.
    pub async fn recv_within(&mut self, timeout: Duration) -> Option<(Instant, Message)> {
        tokio::time::timeout(timeout, self.from_conn.recv())
            .await
            .ok()
            .flatten()
    }

    /// Messages written so far.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut written = Vec::new();
        while let Ok((_, message)) = self.from_conn.try_recv() {
            written.push(message);
        }
        written
    }
}
