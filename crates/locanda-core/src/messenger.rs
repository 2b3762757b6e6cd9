// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The messaging platform abstraction.

use async_trait::async_trait;

use crate::error::LocandaError;

/// A generic inbound message from the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Platform sequence number; the poller advances its offset past it.
    pub update_id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub text: String,
}

/// Messaging platform contract: long poll for updates, send replies.
///
/// The typing indicator is optional; implementations that support it return
/// `true` from [`supports_typing`](Messenger::supports_typing) and the agent
/// loop keeps the indicator alive for the duration of each turn.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Long-polls for updates starting at `offset`, waiting up to
    /// `timeout_secs` before returning an empty batch.
    async fn poll(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>, LocandaError>;

    /// Sends a plain-text message to the chat.
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), LocandaError>;

    /// Sends pre-formatted rich markup. Defaults to the plain-text path.
    async fn send_html(&self, chat_id: i64, html: &str) -> Result<(), LocandaError> {
        self.send(chat_id, html).await
    }

    /// Emits a typing indicator. Only called when
    /// [`supports_typing`](Messenger::supports_typing) returns `true`.
    async fn send_typing(&self, _chat_id: i64) -> Result<(), LocandaError> {
        Ok(())
    }

    /// Whether the platform supports typing indicators.
    fn supports_typing(&self) -> bool {
        false
    }
}
