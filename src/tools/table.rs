//! Immutable tool table snapshots

use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::{Tool, ToolAnnotations};
use crate::spec::{HttpMethod, Operation};

/// A derived, protocol-facing tool
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique name, `[a-z0-9_]{1,64}`
    pub name: String,
    /// Human description
    pub description: String,
    /// JSON schema of the accepted arguments
    pub input_schema: Value,
    /// HTTP method to dispatch with
    pub method: HttpMethod,
    /// Path template to dispatch to
    pub path: String,
    /// Operation the tool was derived from
    pub operation: Operation,
}

impl ToolDescriptor {
    /// Convert to an MCP tool definition
    #[must_use]
    pub fn to_mcp_tool(&self) -> Tool {
        let read_only = matches!(self.method, HttpMethod::Get | HttpMethod::Head);
        Tool {
            name: self.name.clone(),
            title: None,
            description: Some(self.description.clone()),
            input_schema: self.input_schema.clone(),
            output_schema: None,
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(read_only),
                open_world_hint: Some(true),
                ..ToolAnnotations::default()
            }),
        }
    }
}

/// Ordered `name -> ToolDescriptor` map
///
/// Built once per API description and never mutated afterwards; a reload
/// produces a new table that replaces the old one wholesale.
#[derive(Debug, Clone, Default)]
pub struct ToolTable {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tool; the caller guarantees the name is free
    pub(crate) fn push(&mut self, tool: ToolDescriptor) {
        debug_assert!(!self.contains(&tool.name));
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
    }

    /// Look up a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Whether a tool with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tools in derivation order
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    /// Tool names in derivation order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    /// MCP tool definitions in derivation order
    #[must_use]
    pub fn to_mcp_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDescriptor::to_mcp_tool).collect()
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
