// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hotel tool set.
//!
//! Five tools are offered to the model: database query, schema
//! introspection, invite issuance, staff messaging, and reminder
//! scheduling. Per-user queries run through the pool carried in the tool
//! context, so the caller's database principal authorizes every statement.

pub mod dm;
pub mod invite;
pub mod reminder;
pub mod schema;
pub mod sql;

use std::sync::Arc;

use sqlx::PgPool;

use locanda_core::{LocandaError, Messenger, Tool, ToolContext};
use locanda_storage::PrincipalRegistry;

/// Builds the full tool set.
pub fn hotel_tools(
    registry: Arc<PrincipalRegistry>,
    admin: PgPool,
    messenger: Arc<dyn Messenger>,
    bot_handle: String,
) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(sql::ExecuteSqlTool),
        Arc::new(schema::ReadSchemaTool),
        Arc::new(invite::GenerateInviteTool {
            registry,
            bot_handle,
            messenger: messenger.clone(),
        }),
        Arc::new(dm::SendUserMessageTool {
            admin: admin.clone(),
            messenger,
        }),
        Arc::new(reminder::ScheduleReminderTool { admin }),
    ]
}

/// The invoking user's own pool, placed in the context by the extra
/// builder.
pub(crate) fn pool_from(ctx: &ToolContext) -> Result<PgPool, LocandaError> {
    ctx.extra
        .as_ref()
        .and_then(|extra| extra.downcast_ref::<PgPool>())
        .cloned()
        .ok_or_else(|| LocandaError::Tool("no database pool in tool context".into()))
}
