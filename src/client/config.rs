use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::{Error, ErrorContext, Result};

fn default_true() -> bool {
    true
}

/// Client configuration.
///
/// Deserializes from the usual camelCase layout:
///
/// ```rust
/// use rpcall::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(
///     r#"{"server": "http://127.0.0.1:3000", "json": true, "timeout": 5000}"#,
/// ).unwrap();
/// assert!(config.json_prune);
/// assert_eq!(config.timeout_duration(), Some(std::time::Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Server URL: `http(s)://` for HTTP clients, `ws(s)://` for WebSocket clients.
    pub server: String,
    /// Use JSON instead of MessagePack on the wire.
    #[serde(default)]
    pub json: bool,
    /// Drop `null` object members from outgoing JSON payloads.
    #[serde(default = "default_true")]
    pub json_prune: bool,
    /// Default per-call timeout in milliseconds. `None` or `0` means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Log every encoded and decoded buffer at debug level.
    #[serde(default)]
    pub debug_buf: bool,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            json: false,
            json_prune: true,
            timeout: None,
            debug_buf: false,
        }
    }

    pub fn json(mut self, enable: bool) -> Self {
        self.json = enable;
        self
    }

    pub fn json_prune(mut self, enable: bool) -> Self {
        self.json_prune = enable;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }

    pub fn debug_buf(mut self, enable: bool) -> Self {
        self.debug_buf = enable;
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    /// Overlay settings from the environment:
    /// - `RPCALL_SERVER`
    /// - `RPCALL_TIMEOUT_MS`
    /// - `RPCALL_JSON` (`1`/`true`/`yes`)
    /// - `RPCALL_DEBUG_BUF` (`1`/`true`/`yes`)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(server) = env::var("RPCALL_SERVER") {
            if !server.trim().is_empty() {
                self.server = server;
            }
        }
        if let Some(ms) = env::var("RPCALL_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.timeout = Some(ms);
        }
        if let Some(json) = env_flag("RPCALL_JSON") {
            self.json = json;
        }
        if let Some(debug_buf) = env_flag("RPCALL_DEBUG_BUF") {
            self.debug_buf = debug_buf;
        }
        self
    }

    /// Check the server URL parses and uses one of `schemes`.
    pub(crate) fn validate(&self, schemes: &[&str]) -> Result<url::Url> {
        let url = url::Url::parse(&self.server).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid server URL '{}'", self.server),
                ErrorContext::new()
                    .with_field_path("config.server")
                    .with_details(e.to_string())
                    .with_source("client_config"),
            )
        })?;
        if !schemes.contains(&url.scheme()) {
            return Err(Error::configuration_with_context(
                format!("unsupported scheme '{}'", url.scheme()),
                ErrorContext::new()
                    .with_field_path("config.server")
                    .with_details(format!("expected one of: {}", schemes.join(", ")))
                    .with_source("client_config"),
            ));
        }
        Ok(url)
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
