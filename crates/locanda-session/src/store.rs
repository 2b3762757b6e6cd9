// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lazily managed per-user recorders.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::error;

use locanda_core::{LocandaError, Message};

use crate::recorder::Recorder;

/// Manages one [`Recorder`] per user under a configured directory.
///
/// File layout: `<dir>/<user_id>.jsonl`. Recorders (and their files) are
/// created on the first message for each user.
pub struct SessionStore {
    dir: PathBuf,
    recorders: Mutex<HashMap<i64, Arc<Recorder>>>,
}

impl SessionStore {
    /// Creates a store writing transcript files to `dir`, creating the
    /// directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, LocandaError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(LocandaError::storage)?;
        Ok(Self {
            dir,
            recorders: Mutex::new(HashMap::new()),
        })
    }

    /// Appends `msg` to the transcript for `user_id`. Best-effort: any
    /// failure is logged and dropped.
    pub fn record(&self, user_id: i64, msg: &Message) {
        match self.recorder_for(user_id) {
            Ok(recorder) => recorder.record(msg),
            Err(e) => error!(
                user_id,
                error = %e,
                "failed to open session transcript"
            ),
        }
    }

    fn recorder_for(&self, user_id: i64) -> Result<Arc<Recorder>, LocandaError> {
        let mut recorders = self
            .recorders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(r) = recorders.get(&user_id) {
            return Ok(r.clone());
        }
        let path = self.dir.join(format!("{user_id}.jsonl"));
        let recorder = Arc::new(Recorder::open(&path, user_id)?);
        recorders.insert(user_id, recorder.clone());
        Ok(recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TranscriptRecord;
    use locanda_core::{ContentBlock, ToolCall, ToolResult};

    fn read_records(path: &std::path::Path) -> Vec<TranscriptRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn first_record_is_session_init() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        store.record(20, &Message::user_text("hello"));

        let records = read_records(&dir.path().join("20.jsonl"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type, "session");
        assert_eq!(records[0].user_id, Some(20));
        assert_eq!(records[1].record_type, "message");
    }

    #[test]
    fn parent_chain_is_linear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        store.record(21, &Message::user_text("one"));
        store.record(21, &Message::assistant_text("two"));
        store.record(21, &Message::user_text("three"));

        let records = read_records(&dir.path().join("21.jsonl"));
        assert_eq!(records.len(), 4);
        for pair in records.windows(2) {
            assert_eq!(pair[1].parent_id.as_deref(), Some(pair[0].id.as_str()));
        }
    }

    #[test]
    fn reopen_appends_without_second_init() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::new(dir.path()).unwrap();
            store.record(22, &Message::user_text("before restart"));
        }
        {
            let store = SessionStore::new(dir.path()).unwrap();
            store.record(22, &Message::user_text("after restart"));
        }

        let records = read_records(&dir.path().join("22.jsonl"));
        let inits = records
            .iter()
            .filter(|r| r.record_type == "session")
            .count();
        assert_eq!(inits, 1);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn message_ir_round_trips_structurally() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let mut tool_turn = Message::assistant_tool_calls(vec![ToolCall {
            id: "c1".into(),
            name: "execute_sql".into(),
            arguments: serde_json::json!({"query": "SELECT 1"}),
        }]);
        tool_turn.usage = Some(locanda_core::Usage {
            input_tokens: 11,
            output_tokens: 5,
        });
        let results = Message::tool_results(vec![ToolResult {
            tool_call_id: "c1".into(),
            content: "1".into(),
            is_error: false,
        }]);

        store.record(23, &tool_turn);
        store.record(23, &results);

        let records = read_records(&dir.path().join("23.jsonl"));
        assert_eq!(records[1].message.as_ref().unwrap(), &tool_turn);
        let replayed = records[2].message.as_ref().unwrap();
        match &replayed.content[0] {
            ContentBlock::ToolResult { tool_result } => {
                assert_eq!(tool_result.tool_call_id, "c1");
                assert!(!tool_result.is_error);
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn users_get_isolated_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        store.record(30, &Message::user_text("a"));
        store.record(31, &Message::user_text("b"));

        assert!(dir.path().join("30.jsonl").exists());
        assert!(dir.path().join("31.jsonl").exists());
    }
}
