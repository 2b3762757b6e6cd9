// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Staff messaging: direct DMs, context injection, and relay events.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use locanda_core::{
    AgentEvent, EventKind, LocandaError, Message, Messenger, Tool, ToolContext, ToolDef,
};

pub struct SendUserMessageTool {
    pub admin: PgPool,
    pub messenger: Arc<dyn Messenger>,
}

#[derive(Debug, Deserialize)]
struct Args {
    to: String,
    message: String,
}

struct Recipient {
    telegram_id: i64,
    name: String,
    role: String,
}

#[async_trait]
impl Tool for SendUserMessageTool {
    fn def(&self) -> ToolDef {
        ToolDef {
            name: "send_user_message".into(),
            description: "Invia un messaggio Telegram a uno o più utenti registrati. \
                Puoi specificare un nome utente, un ruolo ('manager' o 'cleaner') per \
                inviare a tutti gli utenti con quel ruolo, oppure 'all' per tutti."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "to": {
                        "type": "string",
                        "description": "Nome dell'utente (es. 'Mario'), ruolo ('manager' o 'cleaner'), oppure 'all'"
                    },
                    "message": {
                        "type": "string",
                        "description": "Il testo del messaggio da inviare"
                    }
                },
                "required": ["to", "message"]
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
        if args.to.is_empty() || args.message.is_empty() {
            return Err(LocandaError::Tool("to and message are required".into()));
        }

        let recipients = self.resolve_recipients(&args.to, ctx.user_id).await?;
        if recipients.is_empty() {
            return Ok("⚠️ Nessun utente trovato per il destinatario specificato.".to_string());
        }

        let sender_name = self.sender_name(ctx.user_id).await;

        let mut sent = 0u32;
        let mut failed = 0u32;
        let mut sent_names = Vec::new();

        for recipient in recipients {
            // For a Telegram DM the chat id equals the user's id.
            if self
                .messenger
                .send(recipient.telegram_id, &args.message)
                .await
                .is_err()
            {
                failed += 1;
                continue;
            }
            sent += 1;
            sent_names.push(if recipient.name.is_empty() {
                format!("utente {}", recipient.telegram_id)
            } else {
                recipient.name.clone()
            });

            // The recipient's next turn must be aware of what was said to
            // them.
            ctx.injector.inject(
                recipient.telegram_id,
                Message::assistant_text(&args.message),
            );

            // Managers process incoming staff messages autonomously.
            if recipient.role == "manager" {
                if let Some(bus) = &ctx.bus {
                    bus.publish(AgentEvent {
                        kind: EventKind::Relay,
                        target_user_id: recipient.telegram_id,
                        chat_id: recipient.telegram_id,
                        content: args.message.clone(),
                        source: sender_name.clone(),
                        event_id: Uuid::new_v4().to_string(),
                    })
                    .await;
                }
            }
        }

        let mut result = format!(
            "✅ Messaggio inviato a {sent} utente/i: {}",
            sent_names.join(", ")
        );
        if failed > 0 {
            result.push_str(&format!("\n⚠️ {failed} invio/i fallito/i."));
        }
        Ok(result)
    }
}

impl SendUserMessageTool {
    async fn resolve_recipients(
        &self,
        to: &str,
        sender_id: i64,
    ) -> Result<Vec<Recipient>, LocandaError> {
        let (query, arg) = recipient_query(to);
        let mut q = sqlx::query(query);
        if let Some(arg) = &arg {
            q = q.bind(arg);
        }
        let rows = q
            .fetch_all(&self.admin)
            .await
            .map_err(LocandaError::storage)?;

        let mut recipients = Vec::new();
        for row in rows {
            let recipient = Recipient {
                telegram_id: row.try_get(0).map_err(LocandaError::storage)?,
                name: row.try_get(1).map_err(LocandaError::storage)?,
                role: row.try_get(2).map_err(LocandaError::storage)?,
            };
            // Never message the invoking user.
            if recipient.telegram_id != sender_id {
                recipients.push(recipient);
            }
        }
        Ok(recipients)
    }

    async fn sender_name(&self, sender_id: i64) -> String {
        let name: Option<String> =
            sqlx::query_scalar("SELECT COALESCE(name, '') FROM users WHERE telegram_id = $1")
                .bind(sender_id)
                .fetch_optional(&self.admin)
                .await
                .ok()
                .flatten();
        match name {
            Some(name) if !name.is_empty() => name,
            _ => "system".to_string(),
        }
    }
}

/// Maps the recipient selector to a query: 'all', a role, or a display
/// name (case-insensitive).
fn recipient_query(to: &str) -> (&'static str, Option<String>) {
    match to.trim().to_lowercase().as_str() {
        "all" => (
            "SELECT telegram_id, COALESCE(name, ''), role FROM users",
            None,
        ),
        role @ ("manager" | "cleaner") => (
            "SELECT telegram_id, COALESCE(name, ''), role FROM users WHERE role = $1",
            Some(role.to_string()),
        ),
        _ => (
            "SELECT telegram_id, COALESCE(name, ''), role FROM users WHERE lower(name) = lower($1)",
            Some(to.trim().to_string()),
        ),
    }
}
