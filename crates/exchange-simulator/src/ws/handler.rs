//! Message handlers and the per-session context they run in.

use super::connection::Connection;
use super::message::Message;
use crate::error::{Result, SimulatorError};
use crate::recording::{list_record_files, read_message_record};
use crate::timing::{deadline, wait_until};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Connections and cancellation scope of one WebSocket session.
#[derive(Clone)]
pub struct SessionContext {
    pub client: Arc<dyn Connection>,
    pub upstream: Option<Arc<dyn Connection>>,
    pub cancel: CancellationToken,
}

impl SessionContext {
    pub fn new(
        client: Arc<dyn Connection>,
        upstream: Option<Arc<dyn Connection>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            upstream,
            cancel,
        }
    }

    /// Same connections, different cancellation scope.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn upstream(&self) -> Result<&Arc<dyn Connection>> {
        self.upstream.as_ref().ok_or(SimulatorError::NoUpstream)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("has_upstream", &self.upstream.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync + fmt::Debug {
    async fn handle(&self, message: &Message, session: &SessionContext) -> Result<()>;
}

/// Writes a fixed message to the client once `delay` has passed.
#[derive(Debug, Clone)]
pub struct MessageFromString {
    message: Message,
    delay: Duration,
}

impl MessageFromString {
    pub fn new(message: Message, delay: Duration) -> Self {
        Self { message, delay }
    }
}

#[async_trait]
impl MessageHandler for MessageFromString {
    async fn handle(&self, _message: &Message, session: &SessionContext) -> Result<()> {
        let start = Instant::now();
        wait_until(deadline(start, self.delay), &session.cancel).await?;
        session.client.write(&session.cancel, &self.message).await
    }
}

/// Writes the message stored in a record file, re-read on every call.
#[derive(Debug, Clone)]
pub struct MessageFromFile {
    path: PathBuf,
    delay: Duration,
}

impl MessageFromFile {
    pub fn new(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            path: path.into(),
            delay,
        }
    }
}

#[async_trait]
impl MessageHandler for MessageFromFile {
    async fn handle(&self, _message: &Message, session: &SessionContext) -> Result<()> {
        let start = Instant::now();
        let message = read_message_record(&self.path).await?;
        wait_until(deadline(start, self.delay), &session.cancel).await?;
        session.client.write(&session.cancel, &message).await
    }
}

/// Replays a recorded directory, reproducing the gaps between file timestamps.
///
/// The earliest timestamp is the zero point; each message is written at
/// `call start + (timestamp - zero point)`.
#[derive(Debug, Clone)]
pub struct MessageFromFiles {
    dir: PathBuf,
}

impl MessageFromFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MessageHandler for MessageFromFiles {
    async fn handle(&self, _message: &Message, session: &SessionContext) -> Result<()> {
        let start = Instant::now();
        let files = list_record_files(&self.dir).await?;
        let Some(first) = files.first() else {
            debug!(dir = %self.dir.display(), "No recorded messages to play back");
            return Ok(());
        };
        let zero = first.timestamp;

        for file in &files {
            if session.cancel.is_cancelled() {
                return Err(SimulatorError::Cancelled);
            }
            let offset = (file.timestamp - zero).to_std().unwrap_or_default();
            wait_until(deadline(start, offset), &session.cancel).await?;

            let message = read_message_record(&file.path).await?;
            session.client.write(&session.cancel, &message).await?;
        }

        debug!(dir = %self.dir.display(), count = files.len(), "Playback finished");
        Ok(())
    }
}

/// Runs the inner handler back to back until it fails or is cancelled.
///
/// The inner handler's own delay paces the loop.
#[derive(Debug, Clone)]
pub struct Repeat {
    inner: Arc<dyn MessageHandler>,
}

impl Repeat {
    pub fn new(inner: Arc<dyn MessageHandler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl MessageHandler for Repeat {
    async fn handle(&self, message: &Message, session: &SessionContext) -> Result<()> {
        loop {
            if session.cancel.is_cancelled() {
                return Err(SimulatorError::Cancelled);
            }
            self.inner.handle(message, session).await?;
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::write_message_record;
    use crate::ws::testing::mock_connection;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_message_from_string_waits_for_delay() {
        let (client, mut peer) = mock_connection();
        let session = SessionContext::new(client, None, CancellationToken::new());
        let handler = MessageFromString::new(Message::text("pong"), Duration::from_millis(30));

        let start = Instant::now();
        handler.handle(&Message::text("ping"), &session).await.unwrap();

        let (written_at, message) = peer.recv_within(WAIT).await.unwrap();
        assert_eq!(message, Message::text("pong"));
        let elapsed = written_at - start;
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_message_from_string_cancelled_writes_nothing() {
        let (client, mut peer) = mock_connection();
        let cancel = CancellationToken::new();
        let session = SessionContext::new(client, None, cancel.clone());
        let handler = MessageFromString::new(Message::text("late"), Duration::from_secs(5));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = handler.handle(&Message::text("x"), &session).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_message_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.yaml");
        write_message_record(&path, &Message::binary(vec![0xca, 0xfe]))
            .await
            .unwrap();

        let (client, mut peer) = mock_connection();
        let session = SessionContext::new(client, None, CancellationToken::new());
        MessageFromFile::new(&path, Duration::ZERO)
            .handle(&Message::text("x"), &session)
            .await
            .unwrap();

        let (_, message) = peer.recv_within(WAIT).await.unwrap();
        assert_eq!(message, Message::binary(vec![0xca, 0xfe]));

        let missing = MessageFromFile::new(dir.path().join("missing.yaml"), Duration::ZERO);
        let err = missing.handle(&Message::text("x"), &session).await.unwrap_err();
        assert!(matches!(err, SimulatorError::FileRead { .. }));
    }

    fn write_raw(dir: &TempDir, name: &str, data: &str) {
        std::fs::write(dir.path().join(name), format!("type: text\ndata: {data}\n")).unwrap();
    }

    #[tokio::test]
    async fn test_playback_reproduces_offsets() {
        let dir = TempDir::new().unwrap();
        // created out of order on purpose
        write_raw(&dir, "2000-01-23T12:34:56.020000+09:00.yaml", "third");
        write_raw(&dir, "2000-01-23T12:34:56.000000+09:00.yaml", "first");
        write_raw(&dir, "2000-01-23T12:34:56.010000+09:00.yaml", "second");
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (client, mut peer) = mock_connection();
        let session = SessionContext::new(client, None, CancellationToken::new());

        let start = Instant::now();
        MessageFromFiles::new(dir.path())
            .handle(&Message::text("replay"), &session)
            .await
            .unwrap();

        let expected = [("first", 0u64), ("second", 10), ("third", 20)];
        for (data, offset_ms) in expected {
            let (written_at, message) = peer.recv_within(WAIT).await.unwrap();
            assert_eq!(message, Message::text(data));
            let offset = written_at - start;
            assert!(offset >= Duration::from_millis(offset_ms), "{data} at {offset:?}");
            assert!(
                offset < Duration::from_millis(offset_ms + 25),
                "{data} at {offset:?}"
            );
        }
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_playback_of_empty_directory() {
        let dir = TempDir::new().unwrap();
        let (client, mut peer) = mock_connection();
        let session = SessionContext::new(client, None, CancellationToken::new());

        MessageFromFiles::new(dir.path())
            .handle(&Message::text("replay"), &session)
            .await
            .unwrap();
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_playback_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        write_raw(&dir, "2000-01-23T12:34:56.000000+09:00.yaml", "first");

        let (client, mut peer) = mock_connection();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = SessionContext::new(client, None, cancel);

        let err = MessageFromFiles::new(dir.path())
            .handle(&Message::text("replay"), &session)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_playback_aborts_on_decode_error() {
        let dir = TempDir::new().unwrap();
        write_raw(&dir, "2000-01-23T12:34:56.000000+09:00.yaml", "first");
        std::fs::write(
            dir.path().join("2000-01-23T12:34:56.005000+09:00.yaml"),
            "status: 200\nbody: not a message\n",
        )
        .unwrap();
        write_raw(&dir, "2000-01-23T12:34:56.010000+09:00.yaml", "never sent");

        let (client, mut peer) = mock_connection();
        let session = SessionContext::new(client, None, CancellationToken::new());

        let err = MessageFromFiles::new(dir.path())
            .handle(&Message::text("replay"), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Decode { .. }));
        assert_eq!(peer.drain(), vec![Message::text("first")]);
    }

    #[tokio::test]
    async fn test_playback_of_missing_directory() {
        let dir = TempDir::new().unwrap();
        let (client, _peer) = mock_connection();
        let session = SessionContext::new(client, None, CancellationToken::new());

        let err = MessageFromFiles::new(dir.path().join("absent"))
            .handle(&Message::text("replay"), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, SimulatorError::FileRead { .. }));
    }

    #[tokio::test]
    async fn test_repeat_until_cancelled() {
        let (client, mut peer) = mock_connection();
        let cancel = CancellationToken::new();
        let session = SessionContext::new(client, None, cancel.clone());
        let repeat = Repeat::new(Arc::new(MessageFromString::new(
            Message::text("tick"),
            Duration::from_millis(10),
        )));

        let task = tokio::spawn(async move { repeat.handle(&Message::text("sub"), &session).await });
        for _ in 0..3 {
            let (_, message) = peer.recv_within(WAIT).await.unwrap();
            assert_eq!(message, Message::text("tick"));
        }
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_repeat_stops_on_inner_failure() {
        let (client, _peer) = mock_connection();
        client.fail_writes();
        let session = SessionContext::new(client, None, CancellationToken::new());
        let repeat = Repeat::new(Arc::new(MessageFromString::new(
            Message::text("tick"),
            Duration::ZERO,
        )));

        let err = repeat.handle(&Message::text("sub"), &session).await.unwrap_err();
        assert!(matches!(err, SimulatorError::ConnectionClosed));
    }

    #[test]
    fn test_missing_upstream() {
        let (client, _peer) = mock_connection();
        let session = SessionContext::new(client, None, CancellationToken::new());
        assert!(matches!(session.upstream(), Err(SimulatorError::NoUpstream)));
    }
}
