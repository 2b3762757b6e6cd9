// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-time invite links for new staff members.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use locanda_core::{LocandaError, Messenger, Tool, ToolContext, ToolDef};
use locanda_storage::{PrincipalRegistry, StaffRole};

pub struct GenerateInviteTool {
    pub registry: Arc<PrincipalRegistry>,
    pub bot_handle: String,
    pub messenger: Arc<dyn Messenger>,
}

#[derive(Debug, Deserialize)]
struct Args {
    name: String,
    role: String,
}

#[async_trait]
impl Tool for GenerateInviteTool {
    fn def(&self) -> ToolDef {
        ToolDef {
            name: "generate_invite".into(),
            description: "Genera un link di invito per un nuovo utente. Solo i manager \
                possono usare questo tool. Il link viene consegnato direttamente in chat."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Nome della persona da invitare"
                    },
                    "role": {
                        "type": "string",
                        "enum": ["cleaner", "manager"],
                        "description": "Ruolo da assegnare: 'cleaner' per le cameriere, 'manager' per i responsabili"
                    }
                },
                "required": ["name", "role"]
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
        if args.name.is_empty() {
            return Err(LocandaError::Tool("name is required".into()));
        }
        let role = StaffRole::from_str(&args.role)
            .map_err(|_| LocandaError::Tool(format!("invalid role: {}", args.role)))?;

        let token = self
            .registry
            .create_invite(ctx.user_id, role, &args.name)
            .await?;
        let link = invite_link(&self.bot_handle, &token);

        // The URL lives inside an href attribute and the message bypasses
        // model text generation, so the link is never rewritten.
        let html = format!(
            "🔗 <b>Invito per {}</b> ({role})\n\n<a href=\"{link}\">{link}</a>\n\n<i>Scade tra 7 giorni, monouso</i>",
            escape_html(&args.name),
        );

        if let Err(e) = self.messenger.send_html(ctx.chat_id, &html).await {
            tracing::warn!(error = %e, chat_id = ctx.chat_id, "direct invite delivery failed");
            return Ok(format!(
                "✅ Invito creato per {} ({role}), ma l'invio diretto è fallito.\n\
                 Link: {link}\n⚠️ Il link scade tra 7 giorni ed è monouso.",
                args.name
            ));
        }

        Ok(format!(
            "✅ Invito per {} ({role}) inviato direttamente in chat. \
             Non ripetere il link nella risposta, è già stato consegnato.",
            args.name
        ))
    }
}

fn invite_link(bot_handle: &str, token: &str) -> String {
    format!("https://t.me/{bot_handle}?start={token}")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_link_is_a_start_deep_link() {
        let link = invite_link("locanda_bot", "abcdef0123456789abcdef0123456789");
        assert_eq!(
            link,
            "https://t.me/locanda_bot?start=abcdef0123456789abcdef0123456789"
        );
    }

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(escape_html("Rossi & Bianchi <srl>"), "Rossi &amp; Bianchi &lt;srl&gt;");
        assert_eq!(escape_html("Maria"), "Maria");
    }

    #[test]
    fn args_reject_missing_role() {
        let parsed: Result<Args, _> =
            serde_json::from_value(serde_json::json!({"name": "Maria"}));
        assert!(parsed.is_err());
    }
}
