// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Onboarding and authorization hooks.
//!
//! The onboarding hook redeems invite deep links before authorization runs,
//! so unregistered users can complete registration. The authorization hook
//! rejects everyone else without spending model tokens.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use locanda_agent::{AuthorizeHook, ExtraBuilder, OnboardingHandler};
use locanda_core::LocandaError;
use locanda_storage::{PrincipalRegistry, StaffRole};

/// Fixed user-facing reply for an unknown, redeemed, or expired token.
const INVITE_REJECTED: &str = "Invito non valido o scaduto.";

/// Rejection for users without a registered principal.
const NOT_AUTHORIZED: &str =
    "Questo bot è riservato allo staff. Chiedi al tuo responsabile un link di invito.";

/// Redeems "/start <token>" deep links.
pub struct InviteOnboarding {
    pub registry: Arc<PrincipalRegistry>,
}

#[async_trait]
impl OnboardingHandler for InviteOnboarding {
    async fn handle_start(
        &self,
        user_id: i64,
        _chat_id: i64,
        payload: &str,
    ) -> Result<String, LocandaError> {
        if payload.is_empty() {
            // Bare /start: fall through to normal handling.
            return Ok(String::new());
        }

        match self.registry.use_invite(payload, user_id).await {
            Ok(invite) => {
                info!(user_id, role = %invite.role, "invite redeemed");
                Ok(welcome_message(&invite.name, invite.role))
            }
            Err(LocandaError::InviteInvalid) => Ok(INVITE_REJECTED.to_string()),
            Err(e) => Err(e),
        }
    }
}

/// Lets registered principals through, rejects everyone else.
pub struct RegisteredOnly {
    pub registry: Arc<PrincipalRegistry>,
}

#[async_trait]
impl AuthorizeHook for RegisteredOnly {
    async fn authorize(&self, user_id: i64, _chat_id: i64) -> Result<String, LocandaError> {
        if self.registry.is_registered(user_id).await? {
            Ok(String::new())
        } else {
            Ok(NOT_AUTHORIZED.to_string())
        }
    }
}

/// Places the user's own connection pool in the tool context, so every
/// query a tool runs is authorized as that user's database principal.
pub struct PoolExtraBuilder {
    pub registry: Arc<PrincipalRegistry>,
}

#[async_trait]
impl ExtraBuilder for PoolExtraBuilder {
    async fn build(
        &self,
        user_id: i64,
        _chat_id: i64,
    ) -> Result<Option<Arc<dyn std::any::Any + Send + Sync>>, LocandaError> {
        let pool = self.registry.pool(user_id).await?;
        Ok(Some(Arc::new(pool)))
    }
}

fn welcome_message(name: &str, role: StaffRole) -> String {
    match role {
        StaffRole::Manager => format!(
            "Benvenuto/a {name}! Sei registrato/a come manager. \
             Scrivimi pure per gestire stanze, prenotazioni e staff."
        ),
        StaffRole::Cleaner => format!(
            "Benvenuto/a {name}! Sei registrato/a nello staff di pulizia. \
             Chiedimi \"cosa c'è da fare?\" per vedere le stanze di oggi."
        ),
    }
}
