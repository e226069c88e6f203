//! Error types shared by the rule engine, record codec and transport layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulatorError {
    /// A JSON matcher pattern could not be parsed at construction time.
    #[error("invalid JSON pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("failed to write record {path:?}: {source}")]
    RecordWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),

    #[error("invalid target URL `{url}`: {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    #[error("failed to reach upstream server: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),

    #[error("failed to read upstream response: {0}")]
    UpstreamRead(#[source] reqwest::Error),

    #[error("no upstream connection in this session")]
    NoUpstream,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed")]
    ConnectionClosed,

    /// The operation was stopped through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

impl SimulatorError {
    /// True when the error only reports a deliberate stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SimulatorError::Cancelled)
    }

    /// True for failures caused by the real server behind a redirect rule.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SimulatorError::UpstreamUnreachable(_)
                | SimulatorError::UpstreamRead(_)
                | SimulatorError::InvalidTargetUrl { .. }
                | SimulatorError::NoUpstream
        )
    }
}

pub type Result<T> = std::result::Result<T, SimulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(SimulatorError::Cancelled.is_cancelled());
        assert!(!SimulatorError::ConnectionClosed.is_cancelled());
        assert!(!SimulatorError::NoUpstream.is_cancelled());
    }

    #[test]
    fn test_upstream_classification() {
        let err = SimulatorError::InvalidTargetUrl {
            url: "::".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert!(err.is_upstream());
        assert!(SimulatorError::NoUpstream.is_upstream());
        assert!(!SimulatorError::Encode("x".to_string()).is_upstream());
    }

    #[test]
    fn test_error_messages() {
        let err = SimulatorError::Decode {
            path: PathBuf::from("records/a.yaml"),
            reason: "missing field `status`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to decode \"records/a.yaml\": missing field `status`"
        );
    }
}
