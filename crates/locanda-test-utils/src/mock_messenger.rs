// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted [`Messenger`] for loop tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use locanda_core::{LocandaError, Messenger, Update};

/// A mock messenger fed with scripted update batches.
///
/// Each `poll` pops the next batch; when the script is exhausted the poll
/// blocks until [`push_updates`](MockMessenger::push_updates) provides more,
/// simulating a quiet long poll. Every outbound send and typing indicator is
/// recorded for assertions.
pub struct MockMessenger {
    batches: Mutex<VecDeque<Vec<Update>>>,
    poll_offsets: Mutex<Vec<i64>>,
    sent: Mutex<Vec<(i64, String)>>,
    typing_count: AtomicUsize,
    supports_typing: bool,
    wakeup: Notify,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            poll_offsets: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            typing_count: AtomicUsize::new(0),
            supports_typing: false,
            wakeup: Notify::new(),
        }
    }

    /// A mock that advertises typing-indicator support.
    pub fn with_typing() -> Self {
        Self {
            supports_typing: true,
            ..Self::new()
        }
    }

    /// Queues a batch of updates for a future poll.
    pub fn push_updates(&self, updates: Vec<Update>) {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(updates);
        self.wakeup.notify_one();
    }

    /// Everything sent so far, as `(chat_id, text)` pairs.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Offsets observed by each poll call, in order.
    pub fn poll_offsets(&self) -> Vec<i64> {
        self.poll_offsets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn typing_count(&self) -> usize {
        self.typing_count.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` messages have been sent.
    pub async fn wait_for_sends(&self, n: usize) {
        loop {
            if self.sent().len() >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

impl Default for MockMessenger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn poll(&self, offset: i64, _timeout_secs: u32) -> Result<Vec<Update>, LocandaError> {
        self.poll_offsets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(offset);
        loop {
            let next = self
                .batches
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop_front();
            if let Some(batch) = next {
                return Ok(batch);
            }
            self.wakeup.notified().await;
        }
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), LocandaError> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, _chat_id: i64) -> Result<(), LocandaError> {
        self.typing_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_typing(&self) -> bool {
        self.supports_typing
    }
}
