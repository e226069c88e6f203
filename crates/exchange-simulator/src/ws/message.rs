//! WebSocket message model and conversion to/from tungstenite frames.

use crate::error::{Result, SimulatorError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_tungstenite::tungstenite::Message as Frame;

/// Data frame kind. Matchers use `Option<MessageType>` where `None` is the wildcard,
/// so a concrete [`Message`] never carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Binary,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => f.write_str("text"),
            MessageType::Binary => f.write_str("binary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub data: Bytes,
}

impl Message {
    pub fn new(message_type: MessageType, data: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            data: data.into(),
        }
    }

    pub fn text(data: impl Into<String>) -> Self {
        Self::new(MessageType::Text, Bytes::from(data.into()))
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Binary, data)
    }

    /// Hex rendering of the payload, used in logs.
    pub fn hex_data(&self) -> String {
        hex::encode(&self.data)
    }

    /// Fails for a text message whose payload is not UTF-8.
    pub(crate) fn into_frame(self) -> Result<Frame> {
        match self.message_type {
            MessageType::Text => String::from_utf8(self.data.to_vec())
                .map(Frame::Text)
                .map_err(|e| SimulatorError::Encode(format!("text message is not UTF-8: {e}"))),
            MessageType::Binary => Ok(Frame::Binary(self.data.to_vec())),
        }
    }

    /// Converts a data frame. Control frames yield `None`.
    pub(crate) fn from_frame(frame: Frame) -> Option<Self> {
        match frame {
            Frame::Text(text) => Some(Self::text(text)),
            Frame::Binary(data) => Some(Self::binary(data)),
            _ => None,
        }
    }
}
