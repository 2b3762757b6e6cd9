// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent loop and turn cycle for the Locanda runtime.
//!
//! The [`AgentLoop`] merges two activity sources into one sequential
//! dispatcher:
//! - platform updates forwarded by a background long-poll task,
//! - internal [`AgentEvent`]s from the event bus (relays, heartbeats,
//!   reminders, crash replays).
//!
//! Each event is fully processed before the next is dequeued, so per-user
//! context mutation and the turn cycle need no locking inside a turn.

pub mod context;
pub mod registry;
pub mod shutdown;
mod typing;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use locanda_core::{
    AgentEvent, ChatProvider, ChatRequest, ContextInjector, EventBus, EventKind, LocandaError,
    Message, Messenger, ResponseKind, ToolContext, ToolDef, Update,
};
use locanda_session::SessionStore;

use crate::context::{ContextManager, ContextTable, DEFAULT_MAX_MESSAGES};
use crate::registry::ToolRegistry;
use crate::typing::TypingGuard;

/// Sentinel prefix that routes an update through the onboarding hook.
const START_COMMAND: &str = "/start";

/// Bus events for one user tolerated without an interleaved platform update.
const MAX_CONSECUTIVE_EVENTS: u32 = 10;

/// How long the dispatcher pauses once the consecutive-event limit is hit.
const THROTTLE_SLEEP: Duration = Duration::from_secs(30);

/// Backoff after a failed platform poll.
const POLL_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Capacity of the internal poller-to-dispatcher channel.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Default platform long-poll timeout in seconds.
const DEFAULT_POLL_TIMEOUT_SECS: u32 = 30;

/// Sent to the user when a turn dies on an unrecoverable provider error.
const GENERIC_FAILURE: &str = "Sorry, something went wrong.";

/// Builds the system prompt for a turn. Overrides the static prompt.
#[async_trait]
pub trait PromptBuilder: Send + Sync {
    async fn build(&self, user_id: i64, chat_id: i64) -> String;
}

/// Builds the tool list offered to the model for a turn. Defaults to every
/// registered tool.
#[async_trait]
pub trait ToolsBuilder: Send + Sync {
    async fn build(&self, user_id: i64, chat_id: i64) -> Vec<ToolDef>;
}

/// Produces the opaque per-application value placed in [`ToolContext::extra`]
/// once per turn. A failure is logged and the turn runs without an extra.
#[async_trait]
pub trait ExtraBuilder: Send + Sync {
    async fn build(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Option<Arc<dyn std::any::Any + Send + Sync>>, LocandaError>;
}

/// Handles "/start" deep links, before authorization, so unregistered users
/// can complete onboarding flows. A non-empty reply is sent verbatim without
/// invoking the model; an empty reply falls through to normal handling.
#[async_trait]
pub trait OnboardingHandler: Send + Sync {
    async fn handle_start(
        &self,
        user_id: i64,
        chat_id: i64,
        payload: &str,
    ) -> Result<String, LocandaError>;
}

/// Gate called for every inbound update before any model call. A non-empty
/// rejection string is sent as-is, consuming zero tokens.
#[async_trait]
pub trait AuthorizeHook: Send + Sync {
    async fn authorize(&self, user_id: i64, chat_id: i64) -> Result<String, LocandaError>;
}

/// Construction parameters for [`AgentLoop`].
pub struct AgentOptions {
    pub provider: Arc<dyn ChatProvider>,
    pub messenger: Arc<dyn Messenger>,
    pub registry: Arc<ToolRegistry>,
    /// Static system prompt; ignored when `prompt_builder` is set.
    pub prompt: String,
    pub prompt_builder: Option<Arc<dyn PromptBuilder>>,
    pub tools_builder: Option<Arc<dyn ToolsBuilder>>,
    pub extra_builder: Option<Arc<dyn ExtraBuilder>>,
    pub onboarding: Option<Arc<dyn OnboardingHandler>>,
    pub authorize: Option<Arc<dyn AuthorizeHook>>,
    /// When set, every turn is recorded as JSONL per user.
    pub session: Option<Arc<SessionStore>>,
    /// When absent, only platform updates are processed.
    pub bus: Option<Arc<dyn EventBus>>,
    /// Platform long-poll timeout in seconds (0 means the default of 30).
    pub poll_timeout_secs: u32,
    /// Context ceiling per user (0 means the default of 40).
    pub max_context_messages: usize,
}

/// The central coordinator: demultiplexes events by target user, drives the
/// tool-use turn cycle, and throttles runaway self-talk.
pub struct AgentLoop {
    provider: Arc<dyn ChatProvider>,
    messenger: Arc<dyn Messenger>,
    registry: Arc<ToolRegistry>,
    prompt: String,
    prompt_builder: Option<Arc<dyn PromptBuilder>>,
    tools_builder: Option<Arc<dyn ToolsBuilder>>,
    extra_builder: Option<Arc<dyn ExtraBuilder>>,
    onboarding: Option<Arc<dyn OnboardingHandler>>,
    authorize: Option<Arc<dyn AuthorizeHook>>,
    bus: Option<Arc<dyn EventBus>>,
    poll_timeout_secs: u32,
    contexts: Arc<ContextTable>,
    /// Uninterrupted bus-event turns per user, reset by real platform
    /// updates. Past the limit the dispatcher sleeps before continuing.
    consecutive_events: HashMap<i64, u32>,
}

impl AgentLoop {
    pub fn new(opts: AgentOptions) -> Self {
        let poll_timeout_secs = if opts.poll_timeout_secs == 0 {
            DEFAULT_POLL_TIMEOUT_SECS
        } else {
            opts.poll_timeout_secs
        };
        let max_context = if opts.max_context_messages == 0 {
            DEFAULT_MAX_MESSAGES
        } else {
            opts.max_context_messages
        };
        Self {
            provider: opts.provider,
            messenger: opts.messenger,
            registry: opts.registry,
            prompt: opts.prompt,
            prompt_builder: opts.prompt_builder,
            tools_builder: opts.tools_builder,
            extra_builder: opts.extra_builder,
            onboarding: opts.onboarding,
            authorize: opts.authorize,
            bus: opts.bus,
            poll_timeout_secs,
            contexts: Arc::new(ContextTable::new(max_context, opts.session)),
            consecutive_events: HashMap::new(),
        }
    }

    /// The shared context table; also the [`ContextInjector`] handed to
    /// tools.
    pub fn contexts(&self) -> Arc<ContextTable> {
        self.contexts.clone()
    }

    /// Runs the poller and dispatcher until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), LocandaError> {
        info!("agent loop running");

        let (update_tx, mut update_rx) = mpsc::channel::<Update>(UPDATE_CHANNEL_CAPACITY);
        spawn_poller(
            self.messenger.clone(),
            self.poll_timeout_secs,
            update_tx,
            cancel.clone(),
        );

        let bus = self.bus.clone();
        loop {
            tokio::select! {
                maybe_update = update_rx.recv() => {
                    match maybe_update {
                        Some(update) => self.handle_update(update, &cancel).await,
                        None => break,
                    }
                }
                maybe_event = next_event(&bus), if bus.is_some() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event, &cancel).await,
                        None => break,
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        info!("agent loop stopped");
        Ok(())
    }

    /// Processes one inbound platform update: onboarding, authorization,
    /// context append, turn cycle.
    async fn handle_update(&mut self, update: Update, cancel: &CancellationToken) {
        info!(
            user_id = update.user_id,
            chat_id = update.chat_id,
            text = update.text.as_str(),
            "inbound update"
        );

        // A real user message breaks any bus-event chain for this user.
        self.consecutive_events.insert(update.user_id, 0);

        if update.text.starts_with(START_COMMAND) {
            if let Some(handler) = &self.onboarding {
                let payload = update.text[START_COMMAND.len()..].trim().to_string();
                match handler
                    .handle_start(update.user_id, update.chat_id, &payload)
                    .await
                {
                    Ok(reply) if !reply.is_empty() => {
                        self.send(update.chat_id, &reply).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, user_id = update.user_id, "onboarding failed");
                        self.send(update.chat_id, GENERIC_FAILURE).await;
                        return;
                    }
                }
            }
        }

        if let Some(auth) = &self.authorize {
            match auth.authorize(update.user_id, update.chat_id).await {
                Ok(rejection) if !rejection.is_empty() => {
                    self.send(update.chat_id, &rejection).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, user_id = update.user_id, "authorization failed");
                    self.send(update.chat_id, GENERIC_FAILURE).await;
                    return;
                }
            }
        }

        let ctx = self.contexts.context_for(update.user_id);
        lock_ctx(&ctx).append(Message::user_text(&update.text));

        let tool_ctx = self.build_tool_context(update.user_id, update.chat_id).await;
        self.run_turn(update.chat_id, ctx, tool_ctx, cancel).await;
    }

    /// Processes one bus event by synthesizing it as a user message and
    /// running a full turn for the target user.
    async fn handle_event(&mut self, event: AgentEvent, cancel: &CancellationToken) {
        let count = self
            .consecutive_events
            .entry(event.target_user_id)
            .or_insert(0);
        *count += 1;
        if *count > MAX_CONSECUTIVE_EVENTS {
            error!(
                user_id = event.target_user_id,
                count = *count,
                "consecutive event limit exceeded, throttling"
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(THROTTLE_SLEEP) => {}
            }
        }

        let content = match event.kind {
            EventKind::Relay => format!("[{}]: {}", event.source, event.content),
            _ => event.content.clone(),
        };

        info!(
            user_id = event.target_user_id,
            chat_id = event.chat_id,
            kind = %event.kind,
            content = content.as_str(),
            "bus event"
        );

        let ctx = self.contexts.context_for(event.target_user_id);
        lock_ctx(&ctx).append(Message::user_text(&content));

        let tool_ctx = self
            .build_tool_context(event.target_user_id, event.chat_id)
            .await;
        self.run_turn(event.chat_id, ctx, tool_ctx, cancel).await;

        if let Some(bus) = &self.bus {
            if !event.event_id.is_empty() {
                if let Err(e) = bus.mark_processed(&event.event_id).await {
                    error!(
                        error = %e,
                        event_id = event.event_id.as_str(),
                        "failed to mark event processed"
                    );
                }
            }
        }
    }

    /// The inner model-call / tool-dispatch loop for one turn.
    async fn run_turn(
        &self,
        chat_id: i64,
        ctx: Arc<Mutex<ContextManager>>,
        tool_ctx: ToolContext,
        cancel: &CancellationToken,
    ) {
        let user_id = tool_ctx.user_id;

        let tools = match &self.tools_builder {
            Some(builder) => builder.build(user_id, chat_id).await,
            None => self.registry.definitions(),
        };
        let prompt = match &self.prompt_builder {
            Some(builder) => builder.build(user_id, chat_id).await,
            None => self.prompt.clone(),
        };

        let typing = if self.messenger.supports_typing() {
            Some(TypingGuard::spawn(self.messenger.clone(), chat_id, cancel))
        } else {
            None
        };

        loop {
            let messages = lock_ctx(&ctx).prepare();
            let started = Instant::now();
            let response = self
                .provider
                .chat(ChatRequest {
                    system: prompt.clone(),
                    messages,
                    tools: tools.clone(),
                })
                .await;

            let response = match response {
                Ok(r) => {
                    info!(
                        user_id,
                        input_tokens = r.usage.input_tokens,
                        output_tokens = r.usage.output_tokens,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "model call complete"
                    );
                    r
                }
                Err(e) => {
                    if let Some(t) = &typing {
                        t.stop();
                    }
                    error!(error = %e, user_id, "model call failed");
                    self.send(chat_id, GENERIC_FAILURE).await;
                    break;
                }
            };

            match response.kind {
                ResponseKind::Text => {
                    if let Some(t) = &typing {
                        t.stop();
                    }
                    let mut msg = Message::assistant_text(&response.text);
                    msg.usage = Some(response.usage);
                    lock_ctx(&ctx).append(msg);
                    info!(chat_id, text = response.text.as_str(), "outbound reply");
                    self.send(chat_id, &response.text).await;
                    break;
                }
                ResponseKind::ToolUse => {
                    let mut msg = Message::assistant_tool_calls(response.tool_calls.clone());
                    msg.usage = Some(response.usage);
                    lock_ctx(&ctx).append(msg);

                    let mut results = Vec::with_capacity(response.tool_calls.len());
                    for call in &response.tool_calls {
                        let t0 = Instant::now();
                        let mut result = self
                            .registry
                            .execute(&call.name, call.arguments.clone(), &tool_ctx)
                            .await;
                        if result.tool_call_id.is_empty() {
                            result.tool_call_id = call.id.clone();
                        }
                        info!(
                            tool = call.name.as_str(),
                            elapsed_ms = t0.elapsed().as_millis() as u64,
                            success = !result.is_error,
                            "tool dispatched"
                        );
                        results.push(result);
                    }
                    lock_ctx(&ctx).append(Message::tool_results(results));
                }
            }
        }
        // TypingGuard's drop is the safety close for every exit path.
    }

    async fn build_tool_context(&self, user_id: i64, chat_id: i64) -> ToolContext {
        let extra = match &self.extra_builder {
            Some(builder) => match builder.build(user_id, chat_id).await {
                Ok(extra) => extra,
                Err(e) => {
                    error!(error = %e, user_id, "extra builder failed");
                    None
                }
            },
            None => None,
        };
        ToolContext {
            user_id,
            chat_id,
            timestamp: chrono::Utc::now().timestamp(),
            extra,
            injector: self.contexts.clone() as Arc<dyn ContextInjector>,
            bus: self.bus.clone(),
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.messenger.send(chat_id, text).await {
            error!(error = %e, chat_id, "send failed");
        }
    }
}

/// Receives from the bus, or stays pending forever when no bus is wired.
async fn next_event(bus: &Option<Arc<dyn EventBus>>) -> Option<AgentEvent> {
    match bus {
        Some(bus) => bus.recv().await,
        None => std::future::pending().await,
    }
}

/// Background task that long-polls the platform and forwards updates to the
/// dispatcher. Owns the offset, advancing it past each forwarded update.
/// Cancellation exits immediately, even mid-poll.
fn spawn_poller(
    messenger: Arc<dyn Messenger>,
    timeout_secs: u32,
    tx: mpsc::Sender<Update>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut offset: i64 = 0;
        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => return,
                polled = messenger.poll(offset, timeout_secs) => match polled {
                    Ok(updates) => updates,
                    Err(e) => {
                        error!(error = %e, "platform poll failed");
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(POLL_RETRY_BACKOFF) => {}
                        }
                        continue;
                    }
                },
            };
            for update in updates {
                offset = update.update_id + 1;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(update) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
}

fn lock_ctx(ctx: &Arc<Mutex<ContextManager>>) -> std::sync::MutexGuard<'_, ContextManager> {
    ctx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
