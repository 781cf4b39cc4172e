//! HTTP server configuration.

use secrecy::Secret;
use serde::Deserialize;
use std::net::SocketAddr;

use super::error::ConfigValidationError;

/// Server binding and authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional bearer token; when unset the API is unauthenticated.
    #[serde(default)]
    pub bearer_token: Option<Secret<String>>,
    /// Per-request deadline in seconds for synchronous goal handling.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// The socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| {
                ConfigValidationError::invalid(
                    "server.host/server.port",
                    format!("'{}:{}' is not a valid socket address", self.host, self.port),
                )
            })
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.socket_addr()?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigValidationError::invalid(
                "server.request_timeout_secs",
                "must be positive",
            ));
        }
        Ok(())
    }
}
