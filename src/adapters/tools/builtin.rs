//! Builtin tool sources seeded into the tool directory on first start.
//!
//! Each source carries a `# synapse-tool:` header so the registry can
//! index it without executing anything. Seeding never overwrites an
//! existing file: a deployed improvement survives restarts.

use tracing::info;

use crate::ports::{SourceError, ToolSourceStore};

/// (tool name, source) pairs for the builtin tools.
pub fn builtin_sources() -> Vec<(&'static str, &'static str)> {
    vec![
        ("hello_world", HELLO_WORLD),
        ("calculator_add", CALCULATOR_ADD),
        ("memory_write", MEMORY_WRITE),
        ("memory_read", MEMORY_READ),
        ("strava_get_my_activities", STRAVA_GET_MY_ACTIVITIES),
    ]
}

/// Writes any missing builtin tool into the source store.
pub async fn seed_builtin_tools(store: &dyn ToolSourceStore) -> Result<usize, SourceError> {
    let mut seeded = 0;
    for (name, source) in builtin_sources() {
        if store.read_source(name).await.is_ok() {
            continue;
        }
        store.write_source(name, source).await?;
        info!(tool = name, "seeded builtin tool");
        seeded += 1;
    }
    Ok(seeded)
}

const HELLO_WORLD: &str = r#"# synapse-tool: {"name": "hello_world", "description": "Return a friendly hello world greeting", "parameters": {}, "tags": {"domain": "greeting", "actions": ["greet", "hello"], "synonyms": ["hi", "welcome"]}}

class HelloWorldTool:
    def execute(self):
        return {"message": "Hello, World!"}
"#;

const CALCULATOR_ADD: &str = r#"# synapse-tool: {"name": "calculator_add", "description": "Add two numbers and return the sum", "parameters": {"a": {"type": "number", "description": "First operand", "required": true}, "b": {"type": "number", "description": "Second operand", "required": true}}, "tags": {"domain": "math", "concepts": ["arithmetic"], "actions": ["add", "sum", "calculate"], "synonyms": ["plus"]}}

class CalculatorAddTool:
    def execute(self, a, b):
        return {"sum": a + b}
"#;

const MEMORY_WRITE: &str = r#"# synapse-tool: {"name": "memory_write", "description": "Store a value under a key in persistent memory", "parameters": {"key": {"type": "string", "description": "Storage key", "required": true}, "value": {"type": "string", "description": "Value to remember", "required": true}}, "tags": {"domain": "memory", "actions": ["store", "remember", "save"], "synonyms": ["memorize"]}}

import json
import os

MEMORY_FILE = os.environ.get("SYNAPSE_MEMORY_FILE", "/tmp/synapse_memory.json")


class MemoryWriteTool:
    def execute(self, key, value):
        data = {}
        if os.path.exists(MEMORY_FILE):
            with open(MEMORY_FILE) as f:
                data = json.load(f)
        data[key] = value
        with open(MEMORY_FILE, "w") as f:
            json.dump(data, f)
        return {"stored": True, "key": key}
"#;

const MEMORY_READ: &str = r#"# synapse-tool: {"name": "memory_read", "description": "Recall a value previously stored under a key", "parameters": {"key": {"type": "string", "description": "Storage key", "required": true}}, "tags": {"domain": "memory", "actions": ["recall", "retrieve", "read"], "synonyms": ["remember"]}}

import json
import os

MEMORY_FILE = os.environ.get("SYNAPSE_MEMORY_FILE", "/tmp/synapse_memory.json")


class MemoryReadTool:
    def execute(self, key):
        if not os.path.exists(MEMORY_FILE):
            return {"found": False, "key": key}
        with open(MEMORY_FILE) as f:
            data = json.load(f)
        if key not in data:
            return {"found": False, "key": key}
        return {"found": True, "key": key, "value": data[key]}
"#;

const STRAVA_GET_MY_ACTIVITIES: &str = r#"# synapse-tool: {"name": "strava_get_my_activities", "description": "Fetch the authenticated athlete's recent Strava activities", "parameters": {"limit": {"type": "number", "description": "Maximum activities to return"}}, "tags": {"domain": "fitness", "concepts": ["running", "cycling", "training"], "actions": ["fetch", "list"], "synonyms": ["workouts", "runs", "rides"]}}

import os
import json
import urllib.request


class StravaGetMyActivitiesTool:
    def execute(self, limit=10):
        token = os.environ.get("STRAVA_ACCESS_TOKEN")
        if not token:
            raise RuntimeError("STRAVA_ACCESS_TOKEN is not configured")
        url = "https://www.strava.com/api/v3/athlete/activities?per_page=%d" % int(limit)
        request = urllib.request.Request(url, headers={"Authorization": "Bearer " + token})
        with urllib.request.urlopen(request, timeout=30) as response:
            activities = json.load(response)
        return {"count": len(activities), "activities": activities}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tools::fs_store::FsToolSourceStore;
    use crate::adapters::tools::script_tool::{extract_entry_point, parse_definition};
    use tempfile::TempDir;

    #[test]
    fn every_builtin_has_a_parsable_header_and_entry_point() {
        for (name, source) in builtin_sources() {
            let definition = parse_definition(name, source);
            assert_eq!(definition.name, name, "header name mismatch for {}", name);
            assert!(!definition.description.is_empty());
            assert!(
                extract_entry_point(source).is_some(),
                "no entry point in {}",
                name
            );
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent_and_preserves_edits() {
        let dir = TempDir::new().unwrap();
        let store = FsToolSourceStore::new(dir.path());

        let first = seed_builtin_tools(&store).await.unwrap();
        assert_eq!(first, builtin_sources().len());

        // A deployed improvement must survive re-seeding.
        store
            .write_source("hello_world", "# improved\nclass HelloWorldTool:\n    pass\n")
            .await
            .unwrap();
        let second = seed_builtin_tools(&store).await.unwrap();
        assert_eq!(second, 0);
        assert!(store
            .read_source("hello_world")
            .await
            .unwrap()
            .starts_with("# improved"));
    }
}
