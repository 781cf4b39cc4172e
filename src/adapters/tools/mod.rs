//! Tool adapters: the on-disk source store, file-backed script tools,
//! and the builtin tool sources.

pub mod builtin;
pub mod fs_store;
pub mod script_tool;

pub use builtin::seed_builtin_tools;
pub use fs_store::FsToolSourceStore;
pub use script_tool::{extract_entry_point, parse_definition, ScriptTool};
