//! Sandbox adapters.

mod mock_sandbox;
mod process_sandbox;

pub use mock_sandbox::MockSandbox;
pub use process_sandbox::ProcessSandbox;
