// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram messenger adapter.
//!
//! Implements the [`Messenger`] contract over the raw Bot API through
//! teloxide: `getUpdates` long polling with an explicit offset,
//! `sendMessage` (plain and HTML), and the typing chat action. The runtime
//! never constructs Telegram wire payloads by hand.

use async_trait::async_trait;
use teloxide::payloads::{GetUpdatesSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, ChatAction, ParseMode, UpdateKind};
use teloxide::RequestError;
use tracing::warn;

use locanda_core::{LocandaError, Messenger, Update};

/// Telegram rejects messages longer than 4096 characters.
const MAX_CHUNK_CHARS: usize = 4096;

/// The HTTP client must outlive the longest configured long poll; the
/// teloxide default of about 17 seconds would cut a 30-second getUpdates.
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(90);

/// Messenger over the Telegram Bot API.
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(token: impl Into<String>) -> Result<Self, LocandaError> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LocandaError::Messenger {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            bot: Bot::with_client(token, client),
        })
    }

    async fn send_chunk(&self, chat_id: i64, chunk: &str) -> Result<(), LocandaError> {
        self.bot
            .send_message(ChatId(chat_id), chunk)
            .await
            .map(|_| ())
            .map_err(|e| send_error(chat_id, e))
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn poll(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>, LocandaError> {
        let raw = self
            .bot
            .get_updates()
            .offset(offset as i32)
            .timeout(timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message])
            .await
            .map_err(|e| LocandaError::Messenger {
                message: format!("getUpdates failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(raw.iter().filter_map(to_update).collect())
    }

    /// Sends text, split into chunks at newline boundaries when it exceeds
    /// the platform limit.
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), LocandaError> {
        for chunk in split_at_newlines(text, MAX_CHUNK_CHARS) {
            self.send_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// Sends pre-formatted HTML. On an API rejection (typically a parse
    /// error) the message is retried as plain text so it is never silently
    /// dropped.
    async fn send_html(&self, chat_id: i64, html: &str) -> Result<(), LocandaError> {
        match self
            .bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => Ok(()),
            Err(RequestError::Api(api_err)) => {
                warn!(chat_id, error = %api_err, "HTML send rejected, retrying as plain text");
                self.send(chat_id, html).await
            }
            Err(e) => Err(send_error(chat_id, e)),
        }
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), LocandaError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(|e| send_error(chat_id, e))
    }

    fn supports_typing(&self) -> bool {
        true
    }
}

fn send_error(chat_id: i64, e: RequestError) -> LocandaError {
    LocandaError::Messenger {
        message: format!("send to chat {chat_id} failed: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Converts a raw update into the platform-neutral shape. Updates without a
/// sender or text body are skipped.
fn to_update(raw: &teloxide::types::Update) -> Option<Update> {
    let msg = match &raw.kind {
        UpdateKind::Message(msg) => msg,
        _ => return None,
    };
    let text = msg.text()?;
    let from = msg.from.as_ref()?;
    Some(Update {
        update_id: i64::from(raw.id.0),
        user_id: from.id.0 as i64,
        chat_id: msg.chat.id.0,
        text: text.to_string(),
    })
}

/// Splits text into chunks of at most `max_chars` characters, breaking only
/// at newline boundaries. A window with no newline is hard-split so no
/// content is ever lost.
fn split_at_newlines(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = start + max_chars;
        if end >= chars.len() {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let split_at = chars[start..end].iter().rposition(|&c| c == '\n');
        match split_at {
            // Include the newline in the current chunk.
            Some(rel) => {
                chunks.push(chars[start..start + rel + 1].iter().collect());
                start += rel + 1;
            }
            None => {
                chunks.push(chars[start..end].iter().collect());
                start = end;
            }
        }
    }
    chunks
}
