//! Tool registry, the central index of all registered tools.
//!
//! The runtime registers built-in tools at startup (plus provider proxy
//! tools as connections come up) and queries the registry to dispatch
//! tool calls and to generate the model's tool schema. Allow/deny lists
//! from configuration are applied with [`ToolRegistry::apply_filter`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use strand_core::tools::ToolDefinition;

use crate::traits::Tool;

/// Central registry mapping tool names to their implementations.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!(tool_name = tool.name(), "tool registered");
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Return all tool schemas for the model, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Return all tool names, sorted alphabetically.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop tools not permitted by the allow/deny lists.
    ///
    /// An empty `allow` means all tools are allowed. `deny` always wins
    /// over `allow`.
    pub fn apply_filter(&mut self, allow: &[String], deny: &[String]) {
        self.tools.retain(|name, _| {
            if deny.iter().any(|d| d == name) {
                debug!(tool_name = %name, "tool removed by deny list");
                return false;
            }
            if !allow.is_empty() && !allow.iter().any(|a| a == name) {
                debug!(tool_name = %name, "tool removed by allow list");
                return false;
            }
            true
        });
    }

    /// Remove a tool by name, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    /// Whether a tool with the given name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
