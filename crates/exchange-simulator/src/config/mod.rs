//! Configuration types for the exchange simulator.

mod listen;
mod rules;

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use listen::{ListenConfig, LogFormat, LoggingConfig, MetricsConfig};
pub use rules::{
    HttpConfig, HttpMatchConfig, HttpRespondConfig, HttpRuleConfig, WsConfig, WsHandlerConfig,
    WsMatchConfig, WsMessageRuleConfig, WsRuleConfig,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP rules served under `http.base_path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,
    /// WebSocket rules served on `ws.endpoint`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws: Option<WsConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn listen_address(&self) -> Result<SocketAddr, anyhow::Error> {
        self.listen.address.parse().map_err(|e| {
            anyhow::anyhow!("Invalid listen address '{}': {}", self.listen.address, e)
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.listen_address()?;

        if self.http.is_none() && self.ws.is_none() {
            anyhow::bail!("At least one of 'http' or 'ws' must be configured");
        }

        if let Some(http) = &self.http {
            validate_route_path("http.base_path", &http.base_path)?;
        }

        if let Some(ws) = &self.ws {
            validate_route_path("ws.endpoint", &ws.endpoint)?;
            self.validate_ws_rules(ws)?;
        }

        // a path under both would be ambiguous between the two servers
        if let (Some(http), Some(ws)) = (&self.http, &self.ws) {
            if http.base_path.starts_with(&ws.endpoint) || ws.endpoint.starts_with(&http.base_path)
            {
                anyhow::bail!(
                    "'http.base_path' ({}) and 'ws.endpoint' ({}) must not be a prefix of each other",
                    http.base_path,
                    ws.endpoint
                );
            }
        }

        Ok(())
    }

    fn validate_ws_rules(&self, ws: &WsConfig) -> Result<(), anyhow::Error> {
        for (index, rule) in ws.rules.iter().enumerate() {
            if ws.upstream_url.is_none() && rule.handlers().iter().any(|h| h.uses_upstream()) {
                anyhow::bail!(
                    "WebSocket rule #{} redirects to the upstream but 'ws.upstream_url' is not set",
                    index + 1
                );
            }
            rule.build()
                .map_err(|e| anyhow::anyhow!("WebSocket rule #{}: {}", index + 1, e))?;
        }
        Ok(())
    }
}

fn validate_route_path(field: &str, path: &str) -> Result<(), anyhow::Error> {
    if path.is_empty() {
        anyhow::bail!("'{}' must not be empty", field);
    }
    if !path.starts_with('/') {
        anyhow::bail!("'{}' must start with '/', got '{}'", field, path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
listen:
  address: "127.0.0.1:8080"
metrics:
  enabled: true
  port: 9191
logging:
  level: debug
  format: json
http:
  base_path: /api
  rules:
    - match: { method: GET, path: /test }
      respond: { string: { status: 200, body: OK, delay_ms: 100 } }
ws:
  endpoint: /ws
  upstream_url: ws://127.0.0.1:9000/ws
  rules:
    - match: { text: ping }
      handle: { string: { data: pong, delay_ms: 50 } }
    - match: { any: true }
      handle: redirect
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_yaml(FULL).unwrap();
        assert_eq!(config.listen_address().unwrap().port(), 8080);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9191);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.http.as_ref().unwrap().rules.len(), 1);
        assert_eq!(config.ws.as_ref().unwrap().rules.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("ws:\n  endpoint: /ws\n").unwrap();
        assert_eq!(config.listen.address, "127.0.0.1:8080");
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.http.is_none());
    }

    #[test]
    fn test_requires_http_or_ws() {
        let err = Config::from_yaml("listen:\n  address: 127.0.0.1:8080\n").unwrap_err();
        assert!(err.to_string().contains("At least one"));
    }

    #[test]
    fn test_rejects_overlapping_routes() {
        let yaml = "http:\n  base_path: /api\nws:\n  endpoint: /api/ws\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("prefix"));

        let yaml = "http:\n  base_path: /\nws:\n  endpoint: /ws\n";
        assert!(Config::from_yaml(yaml).is_err());

        let yaml = "http:\n  base_path: /api\nws:\n  endpoint: /ws\n";
        assert!(Config::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_rejects_malformed_route_paths() {
        assert!(Config::from_yaml("http:\n  base_path: ''\n").is_err());
        assert!(Config::from_yaml("ws:\n  endpoint: ws\n").is_err());
    }

    #[test]
    fn test_redirect_requires_upstream() {
        let yaml = r#"
ws:
  endpoint: /ws
  rules:
    - match: { any: true }
      handle: { repeat: redirect }
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("upstream_url"));
    }

    #[test]
    fn test_invalid_json_pattern_is_rejected() {
        let yaml = r#"
ws:
  endpoint: /ws
  rules:
    - match: { json: '{"op"' }
      handle: { string: { data: x } }
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid JSON pattern"));
    }

    #[test]
    fn test_invalid_listen_address() {
        let yaml = "listen:\n  address: localhost\nws:\n  endpoint: /ws\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("simulator.yaml");
        std::fs::write(&path, FULL).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert!(config.ws.unwrap().upstream_url.is_some());

        assert!(Config::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
