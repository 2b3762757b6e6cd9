// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted [`ChatProvider`] for loop tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use locanda_core::{
    ChatProvider, ChatRequest, ChatResponse, LocandaError, ResponseKind, ToolCall, Usage,
};

/// A mock provider that pops pre-configured responses from a FIFO queue.
///
/// When the queue is empty, a default text response is returned. Every
/// request is recorded so tests can assert on the exact message view the
/// model saw.
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<ChatResponse, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Makes every chat call take `delay` before responding (virtual time
    /// under a paused test clock).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a text response with the given usage.
    pub fn push_text(&self, text: &str, usage: Usage) {
        self.push(Ok(ChatResponse {
            kind: ResponseKind::Text,
            text: text.to_string(),
            tool_calls: Vec::new(),
            usage,
            stop_reason: "end_turn".to_string(),
        }));
    }

    /// Queues a tool_use response.
    pub fn push_tool_use(&self, calls: Vec<ToolCall>, usage: Usage) {
        self.push(Ok(ChatResponse {
            kind: ResponseKind::ToolUse,
            text: String::new(),
            tool_calls: calls,
            usage,
            stop_reason: "tool_use".to_string(),
        }));
    }

    /// Queues a provider failure.
    pub fn push_error(&self, message: &str) {
        self.push(Err(message.to_string()));
    }

    fn push(&self, response: Result<ChatResponse, String>) {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(response);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LocandaError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(LocandaError::provider(message)),
            None => Ok(ChatResponse {
                kind: ResponseKind::Text,
                text: "mock response".to_string(),
                tool_calls: Vec::new(),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
                stop_reason: "end_turn".to_string(),
            }),
        }
    }
}
