// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The model provider contract.

use async_trait::async_trait;

use crate::error::LocandaError;
use crate::message::{Message, ToolCall, ToolDef, Usage};

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDef>,
}

/// How the model ended its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// A final text answer.
    Text,
    /// One or more tool invocations to dispatch.
    ToolUse,
}

/// A chat completion response, already folded into the message IR.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub kind: ResponseKind,
    /// Concatenated text blocks; empty for pure tool_use turns.
    pub text: String,
    /// Tool invocations in the order the model emitted them.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: String,
}

/// Tool-calling chat provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LocandaError>;
}
