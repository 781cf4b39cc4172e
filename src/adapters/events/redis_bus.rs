//! Redis pub/sub event bus.
//!
//! Publishes engine events as JSON to a single channel so external
//! observers (dashboards, reactive components) can subscribe without
//! touching the engine's process.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::ports::{EngineEvent, EventBus, EventError};

/// Event bus over a Redis channel.
pub struct RedisEventBus {
    client: redis::Client,
    channel: String,
}

impl RedisEventBus {
    /// Connects lazily to the given Redis URL (e.g. "redis://127.0.0.1/").
    pub fn new(url: &str, channel: impl Into<String>) -> Result<Self, EventError> {
        let client = redis::Client::open(url)
            .map_err(|e| EventError::Publish(format!("invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, event: EngineEvent) -> Result<(), EventError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| EventError::Publish(format!("serialize failed: {}", e)))?;

        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| EventError::Publish(format!("redis connect failed: {}", e)))?;

        conn.publish::<_, _, ()>(&self.channel, payload)
            .await
            .map_err(|e| EventError::Publish(format!("redis publish failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(RedisEventBus::new("not a url", "synapse.events").is_err());
    }

    #[test]
    fn accepts_wellformed_urls_without_connecting() {
        // Connection is lazy; constructing against a non-running server works.
        assert!(RedisEventBus::new("redis://127.0.0.1/", "synapse.events").is_ok());
    }
}
