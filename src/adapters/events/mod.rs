//! Event bus adapters.

mod in_memory;
mod redis_bus;

pub use in_memory::InMemoryEventBus;
pub use redis_bus::RedisEventBus;
