//! PostgreSQL adapters for the execution and version stores.

mod execution_store;
mod version_store;

pub use execution_store::PgExecutionStore;
pub use version_store::PgVersionStore;
