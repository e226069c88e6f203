//! Message matchers: type/payload predicates and structural JSON equality.

use super::message::{Message, MessageType};
use crate::error::{Result, SimulatorError};
use bytes::Bytes;
use serde_json::Value;
use std::fmt;

pub trait MessageMatcher: Send + Sync + fmt::Debug {
    fn matches(&self, message: &Message) -> bool;
}

/// Type and payload equality. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePredicate {
    message_type: Option<MessageType>,
    data: Option<Bytes>,
}

impl MessagePredicate {
    pub fn new(message_type: Option<MessageType>, data: Option<Bytes>) -> Self {
        Self { message_type, data }
    }

    pub fn text(data: impl Into<String>) -> Self {
        Self::new(Some(MessageType::Text), Some(Bytes::from(data.into())))
    }

    /// Predicate accepting every message.
    pub fn any() -> Self {
        Self::default()
    }
}

impl MessageMatcher for MessagePredicate {
    fn matches(&self, message: &Message) -> bool {
        self.message_type
            .map_or(true, |expected| message.message_type == expected)
            && self
                .data
                .as_ref()
                .map_or(true, |expected| message.data == *expected)
    }
}

/// Matches text messages whose payload is the same JSON value as the pattern.
#[derive(Debug, Clone)]
pub struct JsonMessageMatcher {
    pattern: Value,
}

impl JsonMessageMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = serde_json::from_str(pattern).map_err(|source| SimulatorError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { pattern })
    }
}

impl MessageMatcher for JsonMessageMatcher {
    fn matches(&self, message: &Message) -> bool {
        if message.message_type != MessageType::Text {
            return false;
        }
        serde_json::from_slice::<Value>(&message.data)
            .map(|value| json_equal(&self.pattern, &value))
            .unwrap_or(false)
    }
}

/// Deep equality where numbers compare by value, so `1` equals `1.0`.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_predicate() {
        let hello = MessagePredicate::text("hello");
        assert!(hello.matches(&Message::text("hello")));
        assert!(!hello.matches(&Message::text("world")));
        assert!(!hello.matches(&Message::binary("hello")));

        let any_type = MessagePredicate::new(None, Some(Bytes::from("hello")));
        assert!(any_type.matches(&Message::binary("hello")));

        let any_text = MessagePredicate::new(Some(MessageType::Text), None);
        assert!(any_text.matches(&Message::text("anything")));
        assert!(!any_text.matches(&Message::binary(vec![1, 2])));

        assert!(MessagePredicate::any().matches(&Message::binary(Vec::new())));
    }

    #[test]
    fn test_json_matcher_ignores_key_order_and_whitespace() {
        let matcher =
            JsonMessageMatcher::new(r#"{"number1": 123, "number2": 456.789, "string": "abc"}"#)
                .unwrap();
        assert!(matcher.matches(&Message::text(
            r#"{"number2":456.789,"string":"abc","number1":123}"#
        )));

        let array = JsonMessageMatcher::new(r#"[1, "abc", 3.5]"#).unwrap();
        assert!(array.matches(&Message::text(r#"  [  1   ,  "abc"  ,3.5] "#)));
    }

    #[test]
    fn test_json_matcher_numbers_compare_by_value() {
        let matcher = JsonMessageMatcher::new(r#"{"a": 1}"#).unwrap();
        assert!(matcher.matches(&Message::text(r#"{"a": 1.0}"#)));
        assert!(!matcher.matches(&Message::text(r#"{"a": 1.5}"#)));
    }

    #[test]
    fn test_json_matcher_rejects_different_values() {
        let matcher = JsonMessageMatcher::new(r#"{"a":1,"b":2}"#).unwrap();
        assert!(!matcher.matches(&Message::text(r#"{"a":1,"b":3}"#)));
        assert!(!matcher.matches(&Message::text(r#"{"a":1}"#)));
        assert!(!matcher.matches(&Message::text(r#"{"a":1,"b":2,"c":3}"#)));
        assert!(!matcher.matches(&Message::text(r#"{"a":1,"b":2"#)));
    }

    #[test]
    fn test_json_matcher_requires_text() {
        let matcher = JsonMessageMatcher::new(r#"{"key":"value"}"#).unwrap();
        assert!(!matcher.matches(&Message::binary(r#"{"key":"value"}"#)));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = JsonMessageMatcher::new(r#"{"key": "value""#).unwrap_err();
        assert!(matches!(err, SimulatorError::InvalidPattern { .. }));
    }

    #[test]
    fn test_matching_is_repeatable() {
        let predicate = MessagePredicate::text("ping");
        let json = JsonMessageMatcher::new(r#"{"op":"subscribe","args":[1,2]}"#).unwrap();
        let ping = Message::text("ping");
        let subscribe = Message::text(r#"{"args":[1,2],"op":"subscribe"}"#);
        let other = Message::text(r#"{"op":"unsubscribe"}"#);

        for _ in 0..5 {
            assert!(predicate.matches(&ping));
            assert!(!predicate.matches(&subscribe));
            assert!(json.matches(&subscribe));
            assert!(!json.matches(&other));
            assert!(!json.matches(&ping));
        }
        // the inspected messages are left untouched
        assert_eq!(ping, Message::text("ping"));
        assert_eq!(subscribe, Message::text(r#"{"args":[1,2],"op":"subscribe"}"#));
    }
}
