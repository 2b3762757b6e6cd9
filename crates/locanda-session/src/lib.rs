// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only JSONL session recording.
//!
//! Each user gets an isolated transcript file named by external user id;
//! every appended message is written as a record node with a `parent_id`
//! chain for full replay. Recording is best-effort: write failures are
//! logged and dropped so the agent never fails because of transcript I/O.

mod event;
mod recorder;
mod store;

pub use event::{TranscriptRecord, TRANSCRIPT_VERSION};
pub use store::SessionStore;
