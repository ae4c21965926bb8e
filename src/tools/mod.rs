//! Schedule manipulation tools exposed to the model.
//!
//! Each tool validates its own parameters, resolves fuzzy references, and
//! returns a `ToolResult` in every outcome. Failures are data, not errors:
//! only infrastructure faults (storage down) surface as `Err`, and even
//! those are flattened into a failed result at the registry boundary so a
//! bad tool call never aborts a conversation turn.

mod employees;
mod schedule;

pub use employees::{AddEmployeeTool, ListEmployeesTool, UpdateEmployeeTool};
pub use schedule::{
    AssignTaskTool, ClearDayTool, CopyWeekTool, GetScheduleTool, RemoveTaskTool,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::catalog::ProtocolCatalog;
use crate::db::Database;
use crate::error::ToolError;
use crate::llm::ToolDefinition;

/// Outcome of a tool execution, as reported back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    /// Stable machine-readable code, set only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(code.into()),
        }
    }
}

// Failure codes shared across tools.
pub(crate) const ERR_WORKER_NOT_FOUND: &str = "worker_not_found";
pub(crate) const ERR_PROTOCOL_NOT_FOUND: &str = "protocol_not_found";
pub(crate) const ERR_MISSING_FIELDS: &str = "missing_fields";
pub(crate) const ERR_PHONE_EXISTS: &str = "phone_exists";
pub(crate) const ERR_NO_FIELDS: &str = "no_fields";
pub(crate) const ERR_UNKNOWN_TOOL: &str = "unknown_tool";
pub(crate) const ERR_INVALID_PARAMS: &str = "invalid_params";

/// A single schedule operation callable by the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// The tool's declaration for a provider's function-calling request.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Ordered collection of the tools offered to the model each turn.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the full schedule tool set.
    pub fn standard(db: Arc<dyn Database>, catalog: Arc<dyn ProtocolCatalog>) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(AssignTaskTool::new(db.clone(), catalog.clone())),
            Arc::new(RemoveTaskTool::new(db.clone(), catalog.clone())),
            Arc::new(CopyWeekTool::new(db.clone())),
            Arc::new(GetScheduleTool::new(db.clone(), catalog.clone())),
            Arc::new(ClearDayTool::new(db.clone())),
            Arc::new(ListEmployeesTool::new(db.clone())),
            Arc::new(AddEmployeeTool::new(db.clone())),
            Arc::new(UpdateEmployeeTool::new(db)),
        ];
        Self { tools }
    }

    #[cfg(test)]
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Declarations for all registered tools, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Execute a tool by name. Never returns `Err`: unknown tools,
    /// malformed parameters, and storage faults all become failed results.
    pub async fn execute(&self, name: &str, params: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            warn!(tool = name, "Model called an unregistered tool");
            return ToolResult::fail(format!("Unknown tool: {name}"), ERR_UNKNOWN_TOOL);
        };

        debug!(tool = name, %params, "Executing tool");
        match tool.execute(params).await {
            Ok(result) => {
                debug!(tool = name, success = result.success, "Tool finished");
                result
            }
            Err(ToolError::InvalidParameters(reason)) => {
                ToolResult::fail(format!("Invalid parameters: {reason}"), ERR_INVALID_PARAMS)
            }
            Err(ToolError::UnknownTool(name)) => {
                ToolResult::fail(format!("Unknown tool: {name}"), ERR_UNKNOWN_TOOL)
            }
            Err(ToolError::Storage(err)) => {
                error!(tool = name, error = %err, "Tool storage failure");
                ToolResult::fail(
                    "A storage error occurred while executing the tool".to_string(),
                    "storage_error",
                )
            }
        }
    }
}

/// Pull a required string field out of tool parameters.
pub(crate) fn require_str<'a>(
    params: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, ToolError> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("'{field}' is required")))
        .map(str::trim)
}

/// Pull an optional string field; absent, null, and empty all read as `None`.
pub(crate) fn optional_str<'a>(params: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
