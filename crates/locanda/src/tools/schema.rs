// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live schema introspection for the model.

use async_trait::async_trait;

use locanda_core::{LocandaError, Tool, ToolContext, ToolDef};
use locanda_storage::schema::dump_schema;

use super::pool_from;

pub struct ReadSchemaTool;

#[async_trait]
impl Tool for ReadSchemaTool {
    fn def(&self) -> ToolDef {
        ToolDef {
            name: "read_schema".into(),
            description: "Inspect the live database schema: tables, columns, types, \
                and foreign keys. Use this when you need to discover what the \
                database contains, or to debug a failed SQL query."
                .into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _args: serde_json::Value,
    ) -> Result<String, LocandaError> {
        let pool = pool_from(ctx)?;
        dump_schema(&pool).await
    }
}
