//! Tool definitions as advertised to the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema for a single tool exposed to the model.
///
/// `input_schema` is a JSON Schema object describing the tool's
/// parameters, passed through to the provider verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Build a definition with an object schema from property pairs.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Output produced by running a tool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Text content returned to the model.
    pub content: String,
    /// Whether the tool reported failure.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful output.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Failed output with an error description.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}
