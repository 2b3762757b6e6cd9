// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `locanda serve` command implementation.
//!
//! Wires the full runtime: admin pool and schema, per-user principal
//! registry with grant repair, persistent event bus with crash replay,
//! session transcripts, scheduled producers, and the agent loop under one
//! cancellation token.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use locanda_agent::registry::ToolRegistry;
use locanda_agent::{shutdown, AgentLoop, AgentOptions};
use locanda_anthropic::AnthropicClient;
use locanda_core::{EventBus, LocandaError, Messenger};
use locanda_session::SessionStore;
use locanda_storage::{schema, PersistentEventBus, PrincipalRegistry, StaffRole};
use locanda_telegram::TelegramMessenger;

use crate::config::Config;
use crate::onboarding::{InviteOnboarding, PoolExtraBuilder, RegisteredOnly};
use crate::producers;
use crate::prompt::{RolePromptBuilder, RoleToolsBuilder};
use crate::tools;

/// Connection cap for the admin pool (DDL and registry bookkeeping only).
const ADMIN_POOL_MAX_CONNECTIONS: u32 = 5;

pub async fn run(config: Config) -> Result<(), LocandaError> {
    init_tracing(&config.log_level);
    info!(hotel = config.hotel_name.as_str(), "starting locanda serve");

    let admin = PgPoolOptions::new()
        .max_connections(ADMIN_POOL_MAX_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .map_err(LocandaError::storage)?;
    sqlx::query("SELECT 1")
        .execute(&admin)
        .await
        .map_err(LocandaError::storage)?;
    info!("connected to postgres");

    schema::ensure_schema(&admin).await?;

    let principals = Arc::new(PrincipalRegistry::new(
        admin.clone(),
        config.database_url.clone(),
    ));

    // Principals created before the current table set get their grants
    // re-applied.
    if let Err(e) = principals.repair_grants().await {
        warn!(error = %e, "grant repair failed");
    }

    if let Some(manager_id) = config.bootstrap_manager_id {
        if !principals.is_registered(manager_id).await? {
            let name = config.bootstrap_manager_name.clone().unwrap_or_default();
            info!(manager_id, "bootstrapping manager");
            principals
                .register(manager_id, StaffRole::Manager, &name)
                .await?;
        }
    }

    let bus = Arc::new(PersistentEventBus::new(admin.clone()));
    bus.replay_unprocessed().await?;

    let session = Arc::new(SessionStore::new(&config.session_directory)?);

    let provider = Arc::new(AnthropicClient::new(
        config.model_key.clone().unwrap_or_default(),
        config.model_name.clone(),
        config.model_max_tokens,
    )?);

    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(
        config.bot_token.clone().unwrap_or_default(),
    )?);

    let mut registry = ToolRegistry::new();
    registry.register_all(tools::hotel_tools(
        principals.clone(),
        admin.clone(),
        messenger.clone(),
        config.bot_handle.clone(),
    ));
    info!(tools = registry.len(), "tool registry initialized");
    let registry = Arc::new(registry);

    let cancel = shutdown::install_signal_handler();

    producers::reminder::spawn(
        admin.clone(),
        bus.clone() as Arc<dyn EventBus>,
        cancel.clone(),
    );
    let schedule = producers::heartbeat::schedule_from_config(
        config.heartbeat_time.as_deref(),
        config.heartbeat_interval_minutes,
        &config.timezone,
    );
    producers::heartbeat::spawn(
        schedule,
        admin.clone(),
        config.bootstrap_manager_id,
        bus.clone() as Arc<dyn EventBus>,
        cancel.clone(),
    );

    let agent = AgentLoop::new(AgentOptions {
        provider,
        messenger,
        registry: registry.clone(),
        prompt: format!(
            "You are a hotel management assistant for {}. Be concise and practical.",
            config.hotel_name
        ),
        prompt_builder: Some(Arc::new(RolePromptBuilder {
            registry: principals.clone(),
            hotel_name: config.hotel_name.clone(),
        })),
        tools_builder: Some(Arc::new(RoleToolsBuilder {
            registry: principals.clone(),
            tools: registry,
        })),
        extra_builder: Some(Arc::new(PoolExtraBuilder {
            registry: principals.clone(),
        })),
        onboarding: Some(Arc::new(InviteOnboarding {
            registry: principals.clone(),
        })),
        authorize: Some(Arc::new(RegisteredOnly {
            registry: principals,
        })),
        session: Some(session),
        bus: Some(bus.clone() as Arc<dyn EventBus>),
        poll_timeout_secs: config.poll_timeout_seconds,
        max_context_messages: 0,
    });

    agent.run(cancel).await?;

    bus.close();
    info!("locanda serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let crates = [
            "locanda",
            "locanda_agent",
            "locanda_anthropic",
            "locanda_core",
            "locanda_session",
            "locanda_storage",
            "locanda_telegram",
        ];
        let directives: Vec<String> = std::iter::once("warn".to_string())
            .chain(crates.iter().map(|c| format!("{c}={log_level}")))
            .collect();
        EnvFilter::new(directives.join(","))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
