//! Name-keyed collection of tools

use crate::tool::{Tool, ToolDefinition};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Tools available to a runner, ordered by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tool`; a tool with the same name is replaced
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "Replaced tool");
        } else {
            debug!(tool = %name, "Registered tool");
        }
    }

    /// Tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definition by name
    #[must_use]
    pub fn get_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|tool| tool.definition())
    }

    /// Every registered name, sorted
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Definitions of enabled tools, sorted by name
    #[must_use]
    pub fn list_enabled(&self) -> Vec<&ToolDefinition> {
        self.tools
            .values()
            .map(|tool| tool.definition())
            .filter(|def| def.enabled)
            .collect()
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// No tools registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
