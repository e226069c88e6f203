//! WebSocket side of the simulator.
//!
//! # Module Structure
//!
//! - `message` - Message model and frame conversion
//! - `connection` - Cancellable transport over tokio-tungstenite
//! - `matcher` - Payload and JSON matchers
//! - `handler` - Session context, canned replies, playback and repetition
//! - `redirect` - Forwarding to the upstream connection
//! - `subscription` - Subscribe/unsubscribe state machine
//! - `rule` - Rule trait and the ordered ruleset

mod connection;
mod handler;
mod matcher;
mod message;
mod redirect;
mod rule;
mod subscription;
#[cfg(test)]
pub(crate) mod testing;

pub use connection::{dial, Connection, UpstreamConnection, WsConnection};
pub use handler::{
    MessageFromFile, MessageFromFiles, MessageFromString, MessageHandler, Repeat, SessionContext,
};
pub use matcher::{JsonMessageMatcher, MessageMatcher, MessagePredicate};
pub use message::{Message, MessageType};
pub use redirect::RedirectHandler;
pub use rule::{MessageRule, SessionRules, WsRule, WsRuleSet};
pub use subscription::{SubscriptionRule, SubscriptionScope};
