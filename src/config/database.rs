//! PostgreSQL configuration.

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ConfigValidationError;

/// Connection parameters for the execution store database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub database: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    pub password: Secret<String>,
    /// Minimum pool connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "synapse".to_string()
}

fn default_db_user() -> String {
    "synapse".to_string()
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseConfig {
    /// The connection URL handed to the pool.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database
        )
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_connections == 0 {
            return Err(ConfigValidationError::invalid(
                "database.max_connections",
                "must be positive",
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigValidationError::invalid(
                "database.min_connections",
                "exceeds max_connections",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            host: "db".to_string(),
            port: 5432,
            database: "synapse".to_string(),
            user: "synapse".to_string(),
            password: Secret::new("secret".to_string()),
            min_connections: 1,
            max_connections: 10,
        }
    }

    #[test]
    fn url_assembles_all_parts() {
        assert_eq!(config().url(), "postgres://synapse:secret@db:5432/synapse");
    }

    #[test]
    fn inverted_pool_bounds_fail_validation() {
        let mut config = config();
        config.min_connections = 20;
        assert!(config.validate().is_err());
    }
}
