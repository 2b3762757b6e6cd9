// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end agent loop tests over mock adapters.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use locanda_agent::registry::ToolRegistry;
use locanda_agent::{AgentLoop, AgentOptions, AuthorizeHook, OnboardingHandler};
use locanda_core::{
    AgentEvent, ContentBlock, EventBus, EventKind, InMemoryBus, LocandaError, Role, Tool,
    ToolCall, ToolContext, ToolDef, Update, Usage,
};
use locanda_test_utils::{MockMessenger, MockProvider};

fn update(update_id: i64, user_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        user_id,
        chat_id,
        text: text.to_string(),
    }
}

fn options(
    provider: Arc<MockProvider>,
    messenger: Arc<MockMessenger>,
    registry: Arc<ToolRegistry>,
) -> AgentOptions {
    AgentOptions {
        provider,
        messenger,
        registry,
        prompt: "You are a test assistant.".to_string(),
        prompt_builder: None,
        tools_builder: None,
        extra_builder: None,
        onboarding: None,
        authorize: None,
        session: None,
        bus: None,
        poll_timeout_secs: 1,
        max_context_messages: 0,
    }
}

#[tokio::test(start_paused = true)]
async fn text_only_turn_sends_reply_and_appends_context() {
    let messenger = Arc::new(MockMessenger::new());
    let provider = Arc::new(MockProvider::new());
    provider.push_text(
        "hi there",
        Usage {
            input_tokens: 3,
            output_tokens: 2,
        },
    );
    messenger.push_updates(vec![update(1, 20, 10, "hello")]);

    let agent = AgentLoop::new(options(
        provider.clone(),
        messenger.clone(),
        Arc::new(ToolRegistry::new()),
    ));
    let contexts = agent.contexts();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(1).await;
    assert_eq!(messenger.sent(), vec![(10, "hi there".to_string())]);

    let history = contexts.snapshot(20, 10);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text(), "hello");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].text(), "hi there");
    assert_eq!(
        history[1].usage,
        Some(Usage {
            input_tokens: 3,
            output_tokens: 2
        })
    );

    // The poller committed the offset past the consumed update.
    loop {
        let offsets = messenger.poll_offsets();
        if offsets.len() >= 2 {
            assert_eq!(*offsets.last().unwrap(), 2);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

struct CountingEcho {
    calls: Arc<Mutex<u32>>,
}

#[async_trait]
impl Tool for CountingEcho {
    fn def(&self) -> ToolDef {
        ToolDef {
            name: "echo".into(),
            description: "Echo for tests".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"value": {"type": "string"}},
                "required": ["value"]
            }),
        }
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        _args: serde_json::Value,
    ) -> Result<String, LocandaError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok("tool-result".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn tool_use_turn_feeds_results_back_in_order() {
    let messenger = Arc::new(MockMessenger::new());
    let provider = Arc::new(MockProvider::new());
    provider.push_tool_use(
        vec![ToolCall {
            id: "c1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"value": "ok"}),
        }],
        Usage {
            input_tokens: 5,
            output_tokens: 4,
        },
    );
    provider.push_text(
        "done",
        Usage {
            input_tokens: 9,
            output_tokens: 1,
        },
    );
    messenger.push_updates(vec![update(1, 22, 11, "calc")]);

    let calls = Arc::new(Mutex::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CountingEcho {
        calls: calls.clone(),
    }));

    let agent = AgentLoop::new(options(
        provider.clone(),
        messenger.clone(),
        Arc::new(registry),
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(1).await;
    assert_eq!(messenger.sent(), vec![(11, "done".to_string())]);
    assert_eq!(*calls.lock().unwrap(), 1);

    // The second model call saw the batched tool results as the final
    // user message, ids paired in call order.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let last = requests[1].messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content.len(), 1);
    match &last.content[0] {
        ContentBlock::ToolResult { tool_result } => {
            assert_eq!(tool_result.tool_call_id, "c1");
            assert_eq!(tool_result.content, "tool-result");
            assert!(!tool_result.is_error);
        }
        other => panic!("expected tool_result block, got {other:?}"),
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn provider_failure_sends_generic_message_without_assistant_append() {
    let messenger = Arc::new(MockMessenger::new());
    let provider = Arc::new(MockProvider::new());
    provider.push_error("boom");
    messenger.push_updates(vec![update(1, 25, 12, "hello")]);

    let agent = AgentLoop::new(options(
        provider.clone(),
        messenger.clone(),
        Arc::new(ToolRegistry::new()),
    ));
    let contexts = agent.contexts();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(1).await;
    assert_eq!(
        messenger.sent(),
        vec![(12, "Sorry, something went wrong.".to_string())]
    );

    // The generic failure text is not a model utterance; only the user
    // message was appended.
    let history = contexts.snapshot(25, 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

struct RejectAll;

#[async_trait]
impl AuthorizeHook for RejectAll {
    async fn authorize(&self, _user_id: i64, _chat_id: i64) -> Result<String, LocandaError> {
        Ok("Serve un invito per usare questo bot.".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn authorization_rejection_consumes_no_tokens() {
    let messenger = Arc::new(MockMessenger::new());
    let provider = Arc::new(MockProvider::new());
    messenger.push_updates(vec![update(1, 30, 30, "hi")]);

    let mut opts = options(
        provider.clone(),
        messenger.clone(),
        Arc::new(ToolRegistry::new()),
    );
    opts.authorize = Some(Arc::new(RejectAll));
    let agent = AgentLoop::new(opts);
    let contexts = agent.contexts();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(1).await;
    assert_eq!(
        messenger.sent(),
        vec![(30, "Serve un invito per usare questo bot.".to_string())]
    );
    assert_eq!(provider.request_count(), 0);
    assert!(contexts.snapshot(30, 10).is_empty());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

struct TokenOnboarding;

#[async_trait]
impl OnboardingHandler for TokenOnboarding {
    async fn handle_start(
        &self,
        _user_id: i64,
        _chat_id: i64,
        payload: &str,
    ) -> Result<String, LocandaError> {
        if payload == "T" {
            Ok("Benvenuta Maria!".to_string())
        } else {
            Ok(String::new())
        }
    }
}

#[tokio::test(start_paused = true)]
async fn onboarding_runs_before_authorization_and_short_circuits() {
    let messenger = Arc::new(MockMessenger::new());
    let provider = Arc::new(MockProvider::new());
    messenger.push_updates(vec![update(1, 99, 99, "/start T")]);

    let mut opts = options(
        provider.clone(),
        messenger.clone(),
        Arc::new(ToolRegistry::new()),
    );
    opts.onboarding = Some(Arc::new(TokenOnboarding));
    // Authorization would reject; onboarding must win for deep links.
    opts.authorize = Some(Arc::new(RejectAll));
    let agent = AgentLoop::new(opts);
    let contexts = agent.contexts();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(1).await;
    assert_eq!(messenger.sent(), vec![(99, "Benvenuta Maria!".to_string())]);
    assert_eq!(provider.request_count(), 0);
    // No turn ran: the context is untouched.
    assert!(contexts.snapshot(99, 10).is_empty());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn typing_keepalive_refreshes_during_slow_calls() {
    let messenger = Arc::new(MockMessenger::with_typing());
    let provider = Arc::new(MockProvider::new().with_delay(Duration::from_secs(12)));
    provider.push_text(
        "slow answer",
        Usage {
            input_tokens: 1,
            output_tokens: 1,
        },
    );
    messenger.push_updates(vec![update(1, 40, 40, "think hard")]);

    let agent = AgentLoop::new(options(
        provider.clone(),
        messenger.clone(),
        Arc::new(ToolRegistry::new()),
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(1).await;
    // t=0, t=4, t=8 at minimum during a 12 s call.
    assert!(
        messenger.typing_count() >= 3,
        "expected at least 3 typing refreshes, got {}",
        messenger.typing_count()
    );

    // No further typing once the reply is out. Let any in-flight tick
    // settle before taking the baseline.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let after_send = messenger.typing_count();
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(messenger.typing_count(), after_send);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

/// EventBus wrapper that records mark_processed calls.
struct RecordingBus {
    inner: InMemoryBus,
    processed: Mutex<Vec<String>>,
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, event: AgentEvent) {
        self.inner.publish(event).await;
    }

    async fn recv(&self) -> Option<AgentEvent> {
        self.inner.recv().await
    }

    fn close(&self) {
        self.inner.close();
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), LocandaError> {
        self.processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event_id.to_string());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn relay_event_is_rendered_and_marked_processed() {
    let messenger = Arc::new(MockMessenger::new());
    let provider = Arc::new(MockProvider::new());
    provider.push_text(
        "noted",
        Usage {
            input_tokens: 1,
            output_tokens: 1,
        },
    );

    let bus = Arc::new(RecordingBus {
        inner: InMemoryBus::new(),
        processed: Mutex::new(Vec::new()),
    });
    bus.publish(AgentEvent {
        kind: EventKind::Relay,
        target_user_id: 50,
        chat_id: 50,
        content: "turno coperto".into(),
        source: "Maria".into(),
        event_id: "ev-1".into(),
    })
    .await;

    let mut opts = options(
        provider.clone(),
        messenger.clone(),
        Arc::new(ToolRegistry::new()),
    );
    opts.bus = Some(bus.clone());
    let agent = AgentLoop::new(opts);
    let contexts = agent.contexts();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(1).await;
    let history = contexts.snapshot(50, 10);
    assert_eq!(history[0].text(), "[Maria]: turno coperto");

    loop {
        if bus
            .processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&"ev-1".to_string())
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn self_talk_throttle_kicks_in_after_ten_events() {
    let messenger = Arc::new(MockMessenger::new());
    let provider = Arc::new(MockProvider::new());

    let bus = Arc::new(InMemoryBus::new());
    for i in 0..11 {
        bus.publish(AgentEvent {
            kind: EventKind::Relay,
            target_user_id: 5,
            chat_id: 5,
            content: format!("ping {i}"),
            source: "storm".into(),
            event_id: format!("e{i}"),
        })
        .await;
    }

    let mut opts = options(
        provider.clone(),
        messenger.clone(),
        Arc::new(ToolRegistry::new()),
    );
    opts.bus = Some(bus.clone());
    let agent = AgentLoop::new(opts);

    let start = tokio::time::Instant::now();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));

    messenger.wait_for_sends(11).await;
    // The 11th consecutive event paused the dispatcher for 30 s.
    assert!(
        start.elapsed() >= Duration::from_secs(30),
        "expected throttle sleep, elapsed {:?}",
        start.elapsed()
    );

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
