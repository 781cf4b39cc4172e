//! Tool Registry - the in-memory catalogue of loadable tools.
//!
//! The catalogue is an immutable snapshot behind a lock: `refresh()`
//! builds a new map and swaps it atomically, so in-flight executions
//! keep seeing the snapshot they started with.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::adapters::tools::ScriptTool;
use crate::domain::tooling::ToolDefinition;
use crate::ports::{Sandbox, SourceError, Tool, ToolSourceStore};

/// Process-scoped tool catalogue, refreshable from the tool directory.
pub struct ToolRegistry {
    source_store: Option<Arc<dyn ToolSourceStore>>,
    sandbox: Option<Arc<dyn Sandbox>>,
    static_tools: Vec<Arc<dyn Tool>>,
    tools: RwLock<Arc<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    /// Registry over the on-disk tool directory. Call `refresh()` to load.
    pub fn from_sources(
        source_store: Arc<dyn ToolSourceStore>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        Self {
            source_store: Some(source_store),
            sandbox: Some(sandbox),
            static_tools: Vec::new(),
            tools: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Registry holding a fixed set of native tools (tests, embedding).
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let map: HashMap<String, Arc<dyn Tool>> = tools
            .iter()
            .map(|t| (t.definition().name, Arc::clone(t)))
            .collect();
        Self {
            source_store: None,
            sandbox: None,
            static_tools: tools,
            tools: RwLock::new(Arc::new(map)),
        }
    }

    /// Rebuilds the catalogue from static tools plus the tool directory
    /// and swaps it in atomically. Returns the number of loaded tools.
    pub async fn refresh(&self) -> Result<usize, SourceError> {
        let mut map: HashMap<String, Arc<dyn Tool>> = self
            .static_tools
            .iter()
            .map(|t| (t.definition().name, Arc::clone(t)))
            .collect();

        if let (Some(store), Some(sandbox)) = (&self.source_store, &self.sandbox) {
            for (tool_name, source) in store.list_sources().await? {
                match ScriptTool::from_source(&tool_name, &source, Arc::clone(sandbox)) {
                    Ok(tool) => {
                        let definition_name = tool.definition().name;
                        if definition_name != tool_name {
                            warn!(
                                file = %tool_name,
                                header = %definition_name,
                                "tool header name differs from file name; using header"
                            );
                        }
                        if map.insert(definition_name.clone(), Arc::new(tool)).is_some() {
                            warn!(tool = %definition_name, "duplicate tool name, overwriting");
                        }
                    }
                    Err(e) => {
                        warn!(tool = %tool_name, error = %e, "failed to load tool, skipping");
                    }
                }
            }
        }

        let count = map.len();
        *self.tools.write().expect("ToolRegistry: lock poisoned") = Arc::new(map);
        info!(tools = count, "tool registry refreshed");
        Ok(count)
    }

    /// Current snapshot of the catalogue.
    fn snapshot(&self) -> Arc<HashMap<String, Arc<dyn Tool>>> {
        Arc::clone(&self.tools.read().expect("ToolRegistry: lock poisoned"))
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.snapshot().get(name).cloned()
    }

    /// Whether a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }

    /// All tools in the catalogue.
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.snapshot().values().cloned().collect()
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions of every tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.all().iter().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
