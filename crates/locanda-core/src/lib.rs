// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types and adapter traits for the Locanda agent runtime.
//!
//! This crate defines the contract between the runtime and its
//! collaborators:
//! - the provider-neutral message IR ([`Message`], [`ToolCall`],
//!   [`ToolResult`], [`ToolDef`])
//! - the event model ([`AgentEvent`]) and the [`EventBus`] trait with its
//!   in-memory implementation
//! - the [`Messenger`] and [`ChatProvider`] adapter traits
//! - the tool protocol ([`Tool`], [`ToolContext`], [`ContextInjector`])

pub mod bus;
pub mod error;
pub mod event;
pub mod message;
pub mod messenger;
pub mod provider;
pub mod tool;

pub use bus::{EventBus, InMemoryBus};
pub use error::LocandaError;
pub use event::{AgentEvent, EventKind};
pub use message::{ContentBlock, Message, Role, ToolCall, ToolDef, ToolResult, Usage};
pub use messenger::{Messenger, Update};
pub use provider::{ChatProvider, ChatRequest, ChatResponse, ResponseKind};
pub use tool::{ContextInjector, Tool, ToolContext};
