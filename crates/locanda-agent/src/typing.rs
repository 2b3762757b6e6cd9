// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typing keep-alive for long model calls.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use locanda_core::Messenger;

/// Telegram drops the indicator after about 5 seconds; refresh just before.
const REFRESH_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps a typing indicator alive for the duration of one turn.
///
/// The indicator is sent immediately on spawn and refreshed every 4 seconds
/// until [`stop`](TypingGuard::stop) is called. Stopping is idempotent and
/// also happens on drop, as a safety close for any exit path of the turn.
pub struct TypingGuard {
    token: CancellationToken,
}

impl TypingGuard {
    pub fn spawn(messenger: Arc<dyn Messenger>, chat_id: i64, parent: &CancellationToken) -> Self {
        let token = parent.child_token();
        let task_token = token.clone();
        tokio::spawn(async move {
            let _ = messenger.send_typing(chat_id).await;
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            ticker.tick().await; // consume the immediate tick
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => return,
                    _ = ticker.tick() => {
                        let _ = messenger.send_typing(chat_id).await;
                    }
                }
            }
        });
        Self { token }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
