// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Role-specific system prompts and the per-turn prompt / tool-list
//! builders.

use std::sync::Arc;

use async_trait::async_trait;

use locanda_agent::registry::ToolRegistry;
use locanda_agent::{PromptBuilder, ToolsBuilder};
use locanda_core::ToolDef;
use locanda_storage::{PrincipalRegistry, StaffRole};
use tracing::warn;

/// Offered to managers only.
const INVITE_TOOL_NAME: &str = "generate_invite";

/// Builds the system prompt from the user's registered role and name.
pub struct RolePromptBuilder {
    pub registry: Arc<PrincipalRegistry>,
    pub hotel_name: String,
}

#[async_trait]
impl PromptBuilder for RolePromptBuilder {
    async fn build(&self, user_id: i64, _chat_id: i64) -> String {
        match self.registry.profile(user_id).await {
            Ok(Some((name, role))) => {
                let display_name = if name.is_empty() {
                    format!("user {user_id}")
                } else {
                    name
                };
                match role {
                    StaffRole::Manager => manager_prompt(&self.hotel_name, &display_name, user_id),
                    StaffRole::Cleaner => cleaner_prompt(&self.hotel_name, &display_name, user_id),
                }
            }
            Ok(None) => cleaner_prompt(&self.hotel_name, &format!("user {user_id}"), user_id),
            Err(e) => {
                warn!(error = %e, user_id, "profile lookup failed, using cleaner prompt");
                cleaner_prompt(&self.hotel_name, &format!("user {user_id}"), user_id)
            }
        }
    }
}

/// Filters the tool list by role: only managers can issue invites.
pub struct RoleToolsBuilder {
    pub registry: Arc<PrincipalRegistry>,
    pub tools: Arc<ToolRegistry>,
}

#[async_trait]
impl ToolsBuilder for RoleToolsBuilder {
    async fn build(&self, user_id: i64, _chat_id: i64) -> Vec<ToolDef> {
        let defs = self.tools.definitions();
        let is_manager = matches!(
            self.registry.profile(user_id).await,
            Ok(Some((_, StaffRole::Manager)))
        );
        if is_manager {
            defs
        } else {
            defs.into_iter()
                .filter(|d| d.name != INVITE_TOOL_NAME)
                .collect()
        }
    }
}

fn manager_prompt(hotel_name: &str, name: &str, user_id: i64) -> String {
    format!(
        r#"You are the hotel management assistant for {hotel_name}.
You are speaking with {name}, the hotel manager (Telegram ID: {user_id}).

You have full access to the database. Use it to manage rooms, reservations,
cleaning assignments, reminders, and staff.

## Reminders - use them proactively
Whenever the user mentions a time, an event, or a deadline, ALWAYS suggest or
immediately create a reminder with schedule_reminder. Examples:
- "checkout at 11:00" -> propose a reminder at 10:15 for the cleaners
- "guests arrive at 14:00" -> propose a reminder at 13:30 for inspection
The user can always say "no thanks".

## Room lifecycle
available -> occupied (check-in)
occupied -> stayover_due (guests stay, daily cleaning) or checkout_due (checkout day)
stayover_due / checkout_due -> cleaning -> ready -> occupied or available
any -> out_of_service (maintenance)

Assignment types: stayover = light refresh (towels, bed tidy), checkout =
full cleaning (linen change, full sanitize).

## Database
Use read_schema to discover tables and columns when you need to write a
query you are unsure about, or to debug a failed execute_sql call. Do not
call it proactively.

## Tools
- execute_sql: any SQL (SELECT returns a table, mutations return a count)
- read_schema: live schema dump (tables, columns, FKs)
- schedule_reminder: timed reminder for anyone
- send_user_message: Telegram DM to one or more staff members
- generate_invite: one-time invite link for a new staff member

## Rules
- Respond in the same language as the manager
- Be direct and efficient, managers are busy
- Format data clearly (tables or bullet lists)
- Ask for confirmation before bulk destructive operations
- Always suggest reminders when timing is mentioned
"#
    )
}

fn cleaner_prompt(hotel_name: &str, name: &str, user_id: i64) -> String {
    format!(
        r#"You are the cleaning assistant for {hotel_name}.
You are speaking with {name}, a member of the cleaning staff (Telegram ID: {user_id}).

You can see all rooms, assignments, and reservations. You can self-assign to
rooms that need cleaning, update your own tasks, and message colleagues.

## Cleaning types
- stayover: guests remain, change towels and tidy, no linen change
- checkout: guests left, change everything, full sanitize

## What you can do
- See rooms needing cleaning today (status checkout_due / stayover_due / cleaning)
- Self-assign to a room: INSERT INTO assignments (room_id, cleaner_id, type, date, shift, status)
  with cleaner_id = {user_id}
- See and update your own tasks: pending -> in_progress -> done (or skipped)
- Add notes to assignments (damage, missing items)
- Give up a task only while it is still pending
- Schedule reminders for yourself and message colleagues

## What you cannot do
- Modify other colleagues' tasks
- Delete tasks already started
- Add or remove rooms

## Database
Use read_schema to discover exact columns when writing a query or debugging
a failed one. Do not call it automatically.

## Relaying answers to the manager
If the context shows an earlier question from the manager (for example "are
you available?", "can you cover the shift?"), after answering the cleaner use
send_user_message to role manager with a short summary:
  "[cleaner name] replies: [short answer]"
Do this automatically, without asking for confirmation.

## Rules
- Respond in the same language as the cleaner
- Be direct and practical, the cleaner is working
- When asked "what is there to do?" run the room and task queries right away
- Encourage notes on assignments and reminders
"#
    )
}
