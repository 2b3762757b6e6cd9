// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tool protocol: handler trait, execution context, and the narrow
//! cross-user injection capability.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::EventBus;
use crate::error::LocandaError;
use crate::message::{Message, ToolDef};

/// Appends a synthetic message into another user's conversation context so
/// that user's next turn sees the content.
///
/// The agent loop implements this and hands it to tools through the
/// [`ToolContext`]; tools never get a handle to the whole runtime.
pub trait ContextInjector: Send + Sync {
    fn inject(&self, user_id: i64, msg: Message);
}

/// Per-invocation context passed to every tool handler.
#[derive(Clone)]
pub struct ToolContext {
    /// The user whose turn is running.
    pub user_id: i64,
    /// The chat the turn's reply goes to.
    pub chat_id: i64,
    /// Unix timestamp at turn start.
    pub timestamp: i64,
    /// Opaque per-application value produced by the extra builder
    /// (the per-user database pool in the hotel application).
    pub extra: Option<Arc<dyn Any + Send + Sync>>,
    pub injector: Arc<dyn ContextInjector>,
    /// Lets a tool publish follow-up events (the relay pattern).
    pub bus: Option<Arc<dyn EventBus>>,
}

/// A named tool with a JSON-Schema argument shape.
///
/// `execute` errors are captured at the registry boundary and returned to
/// the model as `ToolResult { is_error: true }`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn def(&self) -> ToolDef;

    async fn execute(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<String, LocandaError>;
}
