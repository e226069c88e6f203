//! YAML record files for a single HTTP response or WebSocket message.
//!
//! ```yaml
//! status: 200
//! body: '{"status":"1"}'
//! ```
//!
//! ```yaml
//! type: binary
//! data: 00ff10
//! ```
//!
//! Text payloads are stored verbatim, binary payloads hex-encoded. A response body
//! that is not valid UTF-8 is hex-encoded and flagged with `encoding: hex`.

use crate::error::{Result, SimulatorError};
use crate::http::Response;
use crate::ws::{Message, MessageType};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BodyEncoding {
    Hex,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResponseRecord {
    status: u16,
    #[serde(default)]
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<BodyEncoding>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageRecord {
    #[serde(rename = "type")]
    message_type: MessageType,
    #[serde(default)]
    data: String,
}

pub fn encode_response(response: &Response) -> Result<String> {
    let record = match std::str::from_utf8(&response.body) {
        Ok(body) => ResponseRecord {
            status: response.status_code,
            body: body.to_string(),
            encoding: None,
        },
        Err(_) => ResponseRecord {
            status: response.status_code,
            body: hex::encode(&response.body),
            encoding: Some(BodyEncoding::Hex),
        },
    };
    serde_yaml::to_string(&record).map_err(|e| SimulatorError::Encode(e.to_string()))
}

pub fn decode_response(contents: &str) -> std::result::Result<Response, String> {
    let record: ResponseRecord = serde_yaml::from_str(contents).map_err(|e| e.to_string())?;
    let body = match record.encoding {
        None => Bytes::from(record.body),
        Some(BodyEncoding::Hex) => Bytes::from(hex::decode(&record.body).map_err(|e| e.to_string())?),
    };
    Ok(Response::new(record.status, body))
}

pub fn encode_message(message: &Message) -> Result<String> {
    let data = match message.message_type {
        MessageType::Text => String::from_utf8(message.data.to_vec())
            .map_err(|e| SimulatorError::Encode(format!("text message is not UTF-8: {e}")))?,
        MessageType::Binary => hex::encode(&message.data),
    };
    let record = MessageRecord {
        message_type: message.message_type,
        data,
    };
    serde_yaml::to_string(&record).map_err(|e| SimulatorError::Encode(e.to_string()))
}

pub fn decode_message(contents: &str) -> std::result::Result<Message, String> {
    let record: MessageRecord = serde_yaml::from_str(contents).map_err(|e| e.to_string())?;
    let data = match record.message_type {
        MessageType::Text => Bytes::from(record.data),
        MessageType::Binary => Bytes::from(hex::decode(&record.data).map_err(|e| e.to_string())?),
    };
    Ok(Message::new(record.message_type, data))
}

async fn read_to_string(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SimulatorError::FileRead {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_string(path: &Path, contents: String) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| SimulatorError::RecordWrite {
            path: path.to_path_buf(),
            source,
        })
}

pub async fn write_response_record(path: &Path, response: &Response) -> Result<()> {
    write_string(path, encode_response(response)?).await
}

pub async fn read_response_record(path: &Path) -> Result<Response> {
    let contents = read_to_string(path).await?;
    decode_response(&contents).map_err(|reason| SimulatorError::Decode {
        path: path.to_path_buf(),
        reason,
    })
}

pub async fn write_message_record(path: &Path, message: &Message) -> Result<()> {
    write_string(path, encode_message(message)?).await
}

pub async fn read_message_record(path: &Path) -> Result<Message> {
    let contents = read_to_string(path).await?;
    decode_message(&contents).map_err(|reason| SimulatorError::Decode {
        path: path.to_path_buf(),
        reason,
    })
}
