// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Postgres layer for the Locanda runtime.
//!
//! All state that must survive a restart lives here: the per-user principal
//! registry (one Postgres LOGIN role per end user, so row-level policies
//! apply at the storage layer), invite tokens, scheduled reminders, and the
//! durable side of the event bus.

pub mod events;
pub mod invites;
pub mod principals;
pub mod reminders;
pub mod schema;

pub use events::PersistentEventBus;
pub use invites::Invite;
pub use principals::{PrincipalRegistry, StaffRole};
pub use reminders::{DueReminder, NewReminder};
