use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::providers::{ToolCall, ToolSchema};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub output: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, arguments: &str) -> Result<String>;
}

/// Somewhere tools come from (MCP servers, or a fixed list in tests).
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn discover(&self) -> Result<ToolSet>;
}

/// Tools available to the model for one process lifetime.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool`. A later tool with an existing name is ignored.
    pub fn add(&mut self, tool: Arc<dyn Tool>) -> bool {
        if self.get(tool.name()).is_some() {
            warn!("Duplicate tool '{}' ignored", tool.name());
            return false;
        }
        self.tools.push(tool);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    /// Run one call. Failures become the tool output so the model can react.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        debug!(
            "Executing tool: {} with args: {}",
            call.name, call.arguments
        );

        let output = match self.get(&call.name) {
            Some(tool) => tool
                .execute(&call.arguments)
                .await
                .unwrap_or_else(|e| format!("Error: {}", e)),
            None => format!("Error: Unknown tool: {}", call.name),
        };

        ToolResult {
            call_id: call.id.clone(),
            output,
        }
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .finish()
    }
}

/// Fixed tool list.
pub struct StaticToolSource(pub ToolSet);

#[async_trait]
impl ToolSource for StaticToolSource {
    async fn discover(&self) -> Result<ToolSet> {
        Ok(self.0.clone())
    }
}
