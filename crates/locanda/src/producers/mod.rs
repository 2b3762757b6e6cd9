// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled event producers.
//!
//! Both producers only publish bus events; the agent loop owns the model
//! turns, so the producers themselves have no provider dependency.

pub mod heartbeat;
pub mod reminder;
