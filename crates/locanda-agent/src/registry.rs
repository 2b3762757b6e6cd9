// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named tool registry with error-as-data dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use locanda_core::{Tool, ToolContext, ToolDef, ToolResult};

struct RegisteredTool {
    def: ToolDef,
    tool: Arc<dyn Tool>,
}

/// Maps tool names to handlers. Last write wins on name collision.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under the name its definition declares.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let def = tool.def();
        self.tools
            .insert(def.name.clone(), RegisteredTool { def, tool });
    }

    /// Registers a batch of tools sharing state.
    pub fn register_all(&mut self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Runs the handler for the given call. Always returns a [`ToolResult`];
    /// missing tools and handler failures become `is_error: true` results
    /// rather than raised errors.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolResult {
        let Some(entry) = self.tools.get(name) else {
            return ToolResult {
                tool_call_id: String::new(),
                content: format!("unknown tool: {name}"),
                is_error: true,
            };
        };
        match entry.tool.execute(ctx, args).await {
            Ok(content) => ToolResult {
                tool_call_id: String::new(),
                content,
                is_error: false,
            },
            Err(e) => ToolResult {
                tool_call_id: String::new(),
                content: e.to_string(),
                is_error: true,
            },
        }
    }

    /// All registered definitions, sorted by name so the order is stable.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.def.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
