// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The event model unifying the runtime's internal activity sources.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What kind of activity an [`AgentEvent`] represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An inbound human message replayed through the bus.
    UserMessage,
    /// A message emitted by a tool in one user's turn, targeting another user.
    Relay,
    /// A periodic check-in instruction for a manager.
    Heartbeat,
    /// A scheduled reminder coming due.
    Reminder,
}

/// A single unit of work for the agent loop.
///
/// `target_user_id` selects the conversation context to advance; `chat_id`
/// is where the resulting reply is sent. `event_id` is process-global unique
/// and drives idempotent persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: EventKind,
    pub target_user_id: i64,
    pub chat_id: i64,
    /// Synthesized as the incoming "user message" for the target's turn.
    pub content: String,
    /// Human-readable origin label: a sender's name, "system", "reminder".
    pub source: String,
    pub event_id: String,
}
