// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reminder scheduling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;

use locanda_core::{LocandaError, Tool, ToolContext, ToolDef};
use locanda_storage::{reminders, NewReminder};

pub struct ScheduleReminderTool {
    pub admin: PgPool,
}

#[derive(Debug, Deserialize)]
struct Args {
    fire_at: String,
    message: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    room_id: Option<i64>,
}

#[async_trait]
impl Tool for ScheduleReminderTool {
    fn def(&self) -> ToolDef {
        ToolDef {
            name: "schedule_reminder".into(),
            description: "Programma un reminder che verrà inviato via Telegram a una \
                data/ora precisa. Usa questo tool PROATTIVAMENTE: ogni volta che \
                l'utente menziona un orario o un evento futuro, proponi o crea subito \
                un reminder. Il destinatario può essere l'utente stesso o un altro \
                membro dello staff (per nome)."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "fire_at": {
                        "type": "string",
                        "description": "Data e ora di invio in formato ISO 8601 con timezone, es. '2026-02-24T10:30:00+01:00'"
                    },
                    "message": {
                        "type": "string",
                        "description": "Testo del reminder da inviare"
                    },
                    "to": {
                        "type": "string",
                        "description": "Destinatario: 'me' per se stessi, oppure nome di un altro utente registrato. Default: 'me'."
                    },
                    "room_id": {
                        "type": "integer",
                        "description": "ID della stanza a cui si riferisce il reminder (opzionale)"
                    }
                },
                "required": ["fire_at", "message"]
            }),
        }
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<String, LocandaError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| LocandaError::Tool(format!("invalid arguments: {e}")))?;
        if args.fire_at.is_empty() || args.message.is_empty() {
            return Err(LocandaError::Tool("fire_at and message are required".into()));
        }

        let fire_at_local = DateTime::parse_from_rfc3339(&args.fire_at).map_err(|e| {
            LocandaError::Tool(format!(
                "invalid fire_at format, use ISO 8601 with timezone \
                 (e.g. 2026-02-24T10:30:00+01:00): {e}"
            ))
        })?;
        let fire_at = fire_at_local.with_timezone(&Utc);
        if fire_at <= Utc::now() {
            return Err(LocandaError::Tool("fire_at must be in the future".into()));
        }

        let (chat_id, recipient_name) = self.resolve_recipient(ctx, args.to.as_deref()).await?;

        reminders::schedule(
            &self.admin,
            &NewReminder {
                fire_at,
                chat_id,
                message: args.message.clone(),
                room_id: args.room_id,
                created_by: ctx.user_id,
            },
        )
        .await?;

        let dest = recipient_name.unwrap_or_else(|| "te".to_string());
        Ok(format!(
            "⏰ Reminder programmato per {} alle {} (destinatario: {dest}).",
            fire_at_local.format("%d/%m/%Y"),
            fire_at_local.format("%H:%M"),
        ))
    }
}

impl ScheduleReminderTool {
    /// Resolves the destination chat: the invoking user by default, or a
    /// registered user looked up by name.
    async fn resolve_recipient(
        &self,
        ctx: &ToolContext,
        to: Option<&str>,
    ) -> Result<(i64, Option<String>), LocandaError> {
        let Some(to) = to.filter(|to| !is_self(to)) else {
            return Ok((ctx.chat_id, None));
        };

        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT telegram_id, COALESCE(name, '') FROM users WHERE lower(name) = lower($1)",
        )
        .bind(to)
        .fetch_optional(&self.admin)
        .await
        .map_err(LocandaError::storage)?;

        match row {
            Some((telegram_id, name)) => Ok((telegram_id, Some(name))),
            None => Err(LocandaError::Tool(format!("utente '{to}' non trovato"))),
        }
    }
}

/// "me", "io", or an empty selector all mean the invoking user.
fn is_self(to: &str) -> bool {
    matches!(to.trim().to_lowercase().as_str(), "" | "me" | "io")
}
