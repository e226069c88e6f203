//! HTTP and WebSocket rule configuration, and compilation into rulesets.

use crate::error::{Result, SimulatorError};
use crate::http::{
    HttpRule, HttpRuleSet, RedirectResponder, RequestMatcher, RequestPredicate, Responder,
    ResponseFromFile, ResponseFromString,
};
use crate::recording::RecordDir;
use crate::ws::{
    JsonMessageMatcher, Message, MessageFromFile, MessageFromFiles, MessageFromString,
    MessageHandler, MessageMatcher, MessagePredicate, MessageRule, MessageType, RedirectHandler,
    Repeat, SubscriptionRule, SubscriptionScope, WsRule, WsRuleSet,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ===== HTTP =====

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Prefix stripped from request paths before rule matching
    pub base_path: String,
    #[serde(default)]
    pub rules: Vec<HttpRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpRuleConfig {
    #[serde(rename = "match", default)]
    pub match_config: HttpMatchConfig,
    pub respond: HttpRespondConfig,
}

/// Empty fields match any method or path.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HttpMatchConfig {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpRespondConfig {
    String {
        status: u16,
        #[serde(default)]
        body: String,
        #[serde(default)]
        delay_ms: u64,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        delay_ms: u64,
    },
    Redirect {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        record_dir: Option<PathBuf>,
    },
}

impl HttpMatchConfig {
    fn build(&self) -> RequestPredicate {
        RequestPredicate::new(self.method.clone(), self.path.clone())
    }
}

impl HttpRespondConfig {
    fn build(&self, client: &reqwest::Client) -> Box<dyn Responder> {
        match self {
            HttpRespondConfig::String {
                status,
                body,
                delay_ms,
            } => Box::new(ResponseFromString::new(
                *status,
                body.clone(),
                Duration::from_millis(*delay_ms),
            )),
            HttpRespondConfig::File { path, delay_ms } => Box::new(ResponseFromFile::new(
                path.clone(),
                Duration::from_millis(*delay_ms),
            )),
            HttpRespondConfig::Redirect { url, record_dir } => Box::new(RedirectResponder::new(
                url.clone(),
                record_dir.clone().map(RecordDir::new),
                client.clone(),
            )),
        }
    }
}

impl HttpConfig {
    /// Compiles the rules in declaration order. `client` is shared by every
    /// redirect responder.
    pub fn build(&self, client: &reqwest::Client) -> HttpRuleSet {
        let rules = self
            .rules
            .iter()
            .map(|rule| {
                let matcher: Box<dyn RequestMatcher> = Box::new(rule.match_config.build());
                HttpRule {
                    matcher,
                    responder: rule.respond.build(client),
                }
            })
            .collect();
        HttpRuleSet::new(self.base_path.clone(), rules)
    }
}

// ===== WebSocket =====

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsConfig {
    /// Path upgraded to a WebSocket session
    pub endpoint: String,
    /// Real server dialed at the start of every session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_url: Option<String>,
    /// Directory receiving every message relayed from the upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_dir: Option<PathBuf>,
    #[serde(default)]
    pub rules: Vec<WsRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WsRuleConfig {
    Subscription {
        subscribe: WsMessageRuleConfig,
        unsubscribe: WsMessageRuleConfig,
        update: WsHandlerConfig,
        #[serde(default)]
        scope: SubscriptionScope,
    },
    Message(WsMessageRuleConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsMessageRuleConfig {
    #[serde(rename = "match", default)]
    pub match_config: WsMatchConfig,
    pub handle: WsHandlerConfig,
}

/// At most one of `text`, `binary` and `json` may be set, and `type` must agree
/// with it. With none of them, `type` alone restricts the frame kind. An empty
/// match, or `any: true` on its own, accepts everything.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WsMatchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Hex-encoded payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// JSON pattern compared structurally against text payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WsHandlerConfig {
    /// Fixed message. Binary data is hex-encoded.
    String {
        #[serde(rename = "type", default = "default_message_type")]
        message_type: MessageType,
        data: String,
        #[serde(default)]
        delay_ms: u64,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        delay_ms: u64,
    },
    Files {
        dir: PathBuf,
    },
    Repeat(Box<WsHandlerConfig>),
    Redirect,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

fn decode_hex(field: &str, data: &str) -> Result<Bytes> {
    hex::decode(data)
        .map(Bytes::from)
        .map_err(|e| SimulatorError::InvalidConfig(format!("{field} `{data}` is not valid hex: {e}")))
}

impl WsMatchConfig {
    fn has_conditions(&self) -> bool {
        self.text.is_some()
            || self.binary.is_some()
            || self.json.is_some()
            || self.message_type.is_some()
    }

    /// Frame kind implied by the payload field, if one is set.
    fn payload_type(&self) -> Option<MessageType> {
        if self.binary.is_some() {
            Some(MessageType::Binary)
        } else if self.text.is_some() || self.json.is_some() {
            Some(MessageType::Text)
        } else {
            None
        }
    }

    pub fn build(&self) -> Result<Box<dyn MessageMatcher>> {
        let payloads = [&self.text, &self.binary, &self.json]
            .iter()
            .filter(|p| p.is_some())
            .count();
        if payloads > 1 {
            return Err(SimulatorError::InvalidConfig(
                "a WebSocket match takes only one of `text`, `binary` or `json`".to_string(),
            ));
        }
        match self.any {
            Some(true) if self.has_conditions() => {
                return Err(SimulatorError::InvalidConfig(
                    "`any: true` cannot be combined with other match fields".to_string(),
                ));
            }
            Some(false) if !self.has_conditions() => {
                return Err(SimulatorError::InvalidConfig(
                    "`any: false` needs at least one other match field".to_string(),
                ));
            }
            _ => {}
        }
        if let (Some(declared), Some(implied)) = (self.message_type, self.payload_type()) {
            if declared != implied {
                return Err(SimulatorError::InvalidConfig(format!(
                    "match `type: {declared}` contradicts a {implied} payload"
                )));
            }
        }

        if let Some(pattern) = &self.json {
            return Ok(Box::new(JsonMessageMatcher::new(pattern)?));
        }
        if let Some(text) = &self.text {
            return Ok(Box::new(MessagePredicate::text(text.clone())));
        }
        if let Some(binary) = &self.binary {
            let data = decode_hex("binary match", binary)?;
            return Ok(Box::new(MessagePredicate::new(
                Some(MessageType::Binary),
                Some(data),
            )));
        }
        Ok(Box::new(MessagePredicate::new(self.message_type, None)))
    }
}

impl WsHandlerConfig {
    pub fn build(&self) -> Result<Box<dyn MessageHandler>> {
        let handler: Box<dyn MessageHandler> = match self {
            WsHandlerConfig::String {
                message_type,
                data,
                delay_ms,
            } => {
                let message = match message_type {
                    MessageType::Text => Message::text(data.clone()),
                    MessageType::Binary => Message::binary(decode_hex("binary data", data)?),
                };
                Box::new(MessageFromString::new(
                    message,
                    Duration::from_millis(*delay_ms),
                ))
            }
            WsHandlerConfig::File { path, delay_ms } => Box::new(MessageFromFile::new(
                path.clone(),
                Duration::from_millis(*delay_ms),
            )),
            WsHandlerConfig::Files { dir } => Box::new(MessageFromFiles::new(dir.clone())),
            WsHandlerConfig::Repeat(inner) => Box::new(Repeat::new(Arc::from(inner.build()?))),
            WsHandlerConfig::Redirect => Box::new(RedirectHandler),
        };
        Ok(handler)
    }

    /// True when the handler, or one it wraps, writes to the upstream connection.
    pub fn uses_upstream(&self) -> bool {
        match self {
            WsHandlerConfig::Redirect => true,
            WsHandlerConfig::Repeat(inner) => inner.uses_upstream(),
            _ => false,
        }
    }
}

impl WsRuleConfig {
    pub fn build(&self) -> Result<Arc<dyn WsRule>> {
        match self {
            WsRuleConfig::Message(rule) => Ok(Arc::new(MessageRule::boxed(
                rule.match_config.build()?,
                rule.handle.build()?,
            ))),
            WsRuleConfig::Subscription {
                subscribe,
                unsubscribe,
                update,
                scope,
            } => {
                let rule = SubscriptionRule::new(
                    Arc::from(subscribe.match_config.build()?),
                    Arc::from(subscribe.handle.build()?),
                    Arc::from(unsubscribe.match_config.build()?),
                    Arc::from(unsubscribe.handle.build()?),
                    Arc::from(update.build()?),
                )
                .with_scope(*scope);
                Ok(Arc::new(rule))
            }
        }
    }

    pub fn handlers(&self) -> Vec<&WsHandlerConfig> {
        match self {
            WsRuleConfig::Message(rule) => vec![&rule.handle],
            WsRuleConfig::Subscription {
                subscribe,
                unsubscribe,
                update,
                ..
            } => vec![&subscribe.handle, &unsubscribe.handle, update],
        }
    }
}

impl WsConfig {
    pub fn build(&self) -> Result<WsRuleSet> {
        let rules = self
            .rules
            .iter()
            .map(WsRuleConfig::build)
            .collect::<Result<Vec<_>>>()?;

        let mut ruleset = WsRuleSet::new(self.endpoint.clone(), rules);
        if let Some(url) = &self.upstream_url {
            ruleset = ruleset.with_upstream(url.clone());
        }
        if let Some(dir) = &self.record_dir {
            ruleset = ruleset.with_recorder(RecordDir::new(dir.clone()));
        }
        Ok(ruleset)
    }
}
