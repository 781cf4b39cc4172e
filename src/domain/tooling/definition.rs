//! Tool definitions: the introspection contract every tool exposes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// JSON-ish type name ("string", "number", "boolean", "object").
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ParameterSpec {
    pub fn new(type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            description: description.into(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Optional semantic tags used by discovery to enrich matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticTags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

/// The stable, introspectable description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Parameter name → schema. Ordered for stable documents and prompts.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub tags: SemanticTags,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
            tags: SemanticTags::default(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    pub fn with_tags(mut self, tags: SemanticTags) -> Self {
        self.tags = tags;
        self
    }

    /// Names of parameters marked required.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The flat text indexed for semantic search:
    /// `"<name> <description> <param>: <param description> …"`.
    pub fn searchable_document(&self) -> String {
        let mut doc = format!("{} {}", self.name, self.description);
        for (name, spec) in &self.parameters {
            doc.push_str(&format!(" {}: {}", name, spec.description));
        }
        if let Some(domain) = &self.tags.domain {
            doc.push(' ');
            doc.push_str(domain);
        }
        for word in self
            .tags
            .concepts
            .iter()
            .chain(&self.tags.actions)
            .chain(&self.tags.synonyms)
        {
            doc.push(' ');
            doc.push_str(word);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_definition() -> ToolDefinition {
        ToolDefinition::new("calculator_add", "Add two numbers together")
            .with_parameter("a", ParameterSpec::new("number", "First operand").required())
            .with_parameter("b", ParameterSpec::new("number", "Second operand").required())
            .with_tags(SemanticTags {
                domain: Some("math".into()),
                concepts: vec!["arithmetic".into()],
                actions: vec!["add".into(), "sum".into()],
                synonyms: vec!["plus".into()],
            })
    }

    #[test]
    fn searchable_document_contains_all_parts() {
        let doc = sample_definition().searchable_document();
        assert!(doc.starts_with("calculator_add Add two numbers"));
        assert!(doc.contains("a: First operand"));
        assert!(doc.contains("math"));
        assert!(doc.contains("plus"));
    }

    #[test]
    fn required_parameters_filters_optional() {
        let def = ToolDefinition::new("memory_write", "Store a value under a key")
            .with_parameter("key", ParameterSpec::new("string", "Storage key").required())
            .with_parameter("ttl", ParameterSpec::new("number", "Optional expiry"));
        assert_eq!(def.required_parameters(), vec!["key"]);
    }

    #[test]
    fn definition_roundtrips_through_json() {
        let def = sample_definition();
        let json = serde_json::to_string(&def).unwrap();
        let back: ToolDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}
