//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `SYNAPSE` prefix and
//! `__` as the nesting separator:
//!
//! - `SYNAPSE__SERVER__PORT=8000` -> `server.port`
//! - `SYNAPSE__DATABASE__PASSWORD=...` -> `database.password`
//! - `SYNAPSE__ENGINE__ENABLE_AUTO_IMPROVEMENT=true`
//!
//! # Example
//!
//! ```no_run
//! use synapse::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod ai;
mod database;
mod engine;
mod error;
mod server;

pub use ai::AiConfig;
pub use database::DatabaseConfig;
pub use engine::EngineConfig;
pub use error::{ConfigError, ConfigValidationError};
pub use server::ServerConfig;

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, bearer token).
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection).
    pub database: DatabaseConfig,

    /// Model endpoints (language model + embeddings).
    #[serde(default)]
    pub ai: AiConfig,

    /// Engine behaviour and feature flags.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Loads configuration from the environment (and a `.env` file in
    /// development).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SYNAPSE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of all sections.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.ai.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    #[test]
    fn full_config_validates() {
        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "synapse".to_string(),
                user: "synapse".to_string(),
                password: Secret::new("pw".to_string()),
                min_connections: 1,
                max_connections: 5,
            },
            ai: AiConfig::default(),
            engine: EngineConfig::default(),
        };
        assert!(config.validate().is_ok());
    }
}
