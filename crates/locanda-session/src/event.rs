// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcript record format.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use locanda_core::Message;

/// Transcript format version, written on the session-init record.
pub const TRANSCRIPT_VERSION: u32 = 1;

/// A single append-only node in a session transcript.
///
/// The `parent_id` chain forms a linear linked list of records; the
/// session-init record is the chain root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// "session" or "message".
    #[serde(rename = "type")]
    pub record_type: String,

    /// Only on session-init records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// 4 random bytes, hex-encoded.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Only on session-init records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// The full message IR, only on message records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl TranscriptRecord {
    /// The first record written to a freshly created transcript file.
    pub fn session_init(user_id: i64) -> Self {
        Self {
            record_type: "session".to_string(),
            version: Some(TRANSCRIPT_VERSION),
            id: new_record_id(),
            parent_id: None,
            timestamp: Utc::now(),
            user_id: Some(user_id),
            message: None,
        }
    }

    /// Wraps a message as a recordable node chained to `parent_id`.
    /// `None` marks a record appended to a reopened file whose chain tail
    /// is unknown.
    pub fn message(msg: Message, parent_id: Option<String>) -> Self {
        Self {
            record_type: "message".to_string(),
            version: None,
            id: new_record_id(),
            parent_id,
            timestamp: Utc::now(),
            user_id: None,
            message: Some(msg),
        }
    }
}

/// 4-hex-byte random record id.
fn new_record_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
