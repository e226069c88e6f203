use super::handler::{MessageHandler, SessionContext};
use super::message::Message;
use crate::error::Result;
use async_trait::async_trait;

/// Forwards the client's message unchanged to the session's upstream connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectHandler;

#[async_trait]
impl MessageHandler for RedirectHandler {
    async fn handle(&self, message: &Message, session: &SessionContext) -> Result<()> {
        session.upstream()?.write(&session.cancel, message).await
    }
}
