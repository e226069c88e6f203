//! WebSocket rules and the ordered ruleset served on the WebSocket endpoint.

use super::handler::{MessageHandler, SessionContext};
use super::matcher::MessageMatcher;
use super::message::Message;
use crate::error::Result;
use crate::recording::RecordDir;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait WsRule: Send + Sync + fmt::Debug {
    fn matches(&self, message: &Message) -> bool;

    async fn handle(&self, message: &Message, session: &SessionContext) -> Result<()>;

    /// Fresh instance for a new session, for rules that keep per-session state.
    /// `None` means the rule is shared as is.
    fn session_instance(&self) -> Option<Arc<dyn WsRule>> {
        None
    }
}

/// A matcher paired with a handler.
#[derive(Debug)]
pub struct MessageRule {
    matcher: Box<dyn MessageMatcher>,
    handler: Box<dyn MessageHandler>,
}

impl MessageRule {
    pub fn new(
        matcher: impl MessageMatcher + 'static,
        handler: impl MessageHandler + 'static,
    ) -> Self {
        Self::boxed(Box::new(matcher), Box::new(handler))
    }

    pub fn boxed(matcher: Box<dyn MessageMatcher>, handler: Box<dyn MessageHandler>) -> Self {
        Self { matcher, handler }
    }
}

#[async_trait]
impl WsRule for MessageRule {
    fn matches(&self, message: &Message) -> bool {
        self.matcher.matches(message)
    }

    async fn handle(&self, message: &Message, session: &SessionContext) -> Result<()> {
        self.handler.handle(message, session).await
    }
}

/// Endpoint, upstream settings and the rules evaluated for each client message.
#[derive(Debug, Clone)]
pub struct WsRuleSet {
    endpoint: String,
    upstream_url: Option<String>,
    recorder: Option<RecordDir>,
    rules: Vec<Arc<dyn WsRule>>,
}

impl WsRuleSet {
    pub fn new(endpoint: impl Into<String>, rules: Vec<Arc<dyn WsRule>>) -> Self {
        Self {
            endpoint: endpoint.into(),
            upstream_url: None,
            recorder: None,
            rules,
        }
    }

    pub fn with_upstream(mut self, upstream_url: impl Into<String>) -> Self {
        self.upstream_url = Some(upstream_url.into());
        self
    }

    pub fn with_recorder(mut self, recorder: RecordDir) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn upstream_url(&self) -> Option<&str> {
        self.upstream_url.as_deref()
    }

    pub fn recorder(&self) -> Option<&RecordDir> {
        self.recorder.as_ref()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find_rule(&self, message: &Message) -> Option<&Arc<dyn WsRule>> {
        self.rules.iter().find(|rule| rule.matches(message))
    }

    /// The rules one session works with: per-session rules are instantiated
    /// fresh, the rest are shared.
    pub fn for_session(&self) -> Vec<Arc<dyn WsRule>> {
        self.rules
            .iter()
            .map(|rule| rule.session_instance().unwrap_or_else(|| Arc::clone(rule)))
            .collect()
    }
}

/// Session-local view of a [`WsRuleSet`].
pub struct SessionRules {
    rules: Vec<Arc<dyn WsRule>>,
}

impl SessionRules {
    pub fn new(ruleset: &WsRuleSet) -> Self {
        Self {
            rules: ruleset.for_session(),
        }
    }

    pub fn find_rule(&self, message: &Message) -> Option<&Arc<dyn WsRule>> {
        self.rules.iter().find(|rule| rule.matches(message))
    }
}
