//! Adapter exposing a provider tool through the local tool trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use strand_core::tools::{ToolDefinition, ToolOutput};
use strand_tools::{Tool, ToolContext, ToolError};

use crate::manager::ProviderManager;

/// A namespaced provider tool, callable like any builtin.
pub struct ProviderProxyTool {
    manager: Arc<ProviderManager>,
    definition: ToolDefinition,
}

impl ProviderProxyTool {
    /// Wrap one namespaced definition from the manager.
    #[must_use]
    pub fn new(manager: Arc<ProviderManager>, definition: ToolDefinition) -> Self {
        Self {
            manager,
            definition,
        }
    }
}

#[async_trait]
impl Tool for ProviderProxyTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let arguments = if params.is_null() {
            None
        } else {
            Some(params)
        };
        let result = self
            .manager
            .call(&self.definition.name, arguments)
            .await
            .map_err(|e| ToolError::Internal {
                message: e.to_string(),
            })?;
        let text = result.render_text();
        if result.is_error {
            Ok(ToolOutput::error(text))
        } else {
            Ok(ToolOutput::text(text))
        }
    }
}
