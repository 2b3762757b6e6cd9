// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user transcript writer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing::error;

use locanda_core::{LocandaError, Message};

use crate::event::TranscriptRecord;

struct RecorderInner {
    file: File,
    /// parent_id for the next record.
    last_id: Option<String>,
}

/// Writes records for a single user to an append-only JSONL file.
///
/// One writer lock per user file; writers across users never contend.
pub(crate) struct Recorder {
    user_id: i64,
    inner: Mutex<RecorderInner>,
}

impl Recorder {
    /// Opens (or creates) the transcript file. A session-init record is
    /// written only when the file is newly created, i.e. its size is zero.
    pub(crate) fn open(path: &Path, user_id: i64) -> Result<Self, LocandaError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(LocandaError::storage)?;

        let size = file.metadata().map_err(LocandaError::storage)?.len();

        let mut inner = RecorderInner {
            file,
            last_id: None,
        };

        if size == 0 {
            let init = TranscriptRecord::session_init(user_id);
            write_record(&mut inner.file, &init)?;
            inner.last_id = Some(init.id);
        }

        Ok(Self {
            user_id,
            inner: Mutex::new(inner),
        })
    }

    /// Appends a message record. Failures are logged and dropped.
    pub(crate) fn record(&self, msg: &Message) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let parent = inner.last_id.clone();
        let record = TranscriptRecord::message(msg.clone(), parent);
        match write_record(&mut inner.file, &record) {
            Ok(()) => inner.last_id = Some(record.id),
            Err(e) => error!(
                user_id = self.user_id,
                error = %e,
                "session transcript write failed, record dropped"
            ),
        }
    }
}

fn write_record(file: &mut File, record: &TranscriptRecord) -> Result<(), LocandaError> {
    let mut line = serde_json::to_vec(record).map_err(LocandaError::storage)?;
    line.push(b'\n');
    file.write_all(&line).map_err(LocandaError::storage)
}
