//! End-to-end turn flows against real built-in tools and state stores,
//! with only the language model scripted.

use sotto_core::error::ProviderError;
use sotto_core::message::{Message, MessageToolCall, Role};
use sotto_core::provider::{ChatRequest, ChatResponse, LanguageModel};
use sotto_core::state::{SessionState, StateStore};
use sotto_core::tool::ToolRegistry;
use sotto_engine::{ContextStore, Engine};
use sotto_memory::FileStateStore;
use sotto_providers::retry::RetryPolicy;
use sotto_tools::{Policy, default_registry};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedModel {
    script: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
    /// Transient failures injected before each scripted response is served
    transient_failures: Mutex<u32>,
}

impl ScriptedModel {
    fn new(script: Vec<ChatResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            transient_failures: Mutex::new(0),
        }
    }

    fn with_transient_failures(self, failures: u32) -> Self {
        *self.transient_failures.lock().unwrap() = failures;
        self
    }

    fn text(content: &str) -> ChatResponse {
        ChatResponse {
            message: Message::assistant(content),
            usage: None,
            model: "scripted".into(),
        }
    }

    fn calls(calls: &[(&str, &str, &str)]) -> ChatResponse {
        ChatResponse {
            message: Message::assistant_with_calls(
                "",
                calls
                    .iter()
                    .map(|(id, name, args)| MessageToolCall {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: args.to_string(),
                    })
                    .collect(),
            ),
            usage: None,
            model: "scripted".into(),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let mut failures = self.transient_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ProviderError::Network("socket closed".into()));
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))
    }
}

fn engine_with(model: Arc<ScriptedModel>, tools: Arc<ToolRegistry>) -> Engine {
    Engine::new(
        model,
        "test-model",
        tools,
        ContextStore::new("You are a test assistant.", 50),
        SessionState::new("flow-session"),
    )
    .with_retry_policy(RetryPolicy::none())
}

fn clock_registry() -> Arc<ToolRegistry> {
    // The real built-in registry, sandboxed to nothing dangerous
    Arc::new(default_registry(&Policy::default()))
}

#[tokio::test]
async fn simple_reply_through_real_clock_tool() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedModel::calls(&[("call_1", "get_current_time", "{}")]),
        ScriptedModel::text("It is just past the hour."),
    ]));
    let mut engine = engine_with(model.clone(), clock_registry());

    let outcome = engine.handle_turn("What time is it?").await;

    assert_eq!(outcome.reply, "It is just past the hour.");
    assert_eq!(outcome.tool_invocations, 1);

    // Context beyond the system message: user, assistant(call),
    // tool-result, assistant — exactly four.
    let messages = engine.context().messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[3].role, Role::Tool);
    // The real clock tool produced a plausible time string
    assert!(messages[3].content.contains(':'));

    // The second model call happened after the result was appended
    let second = &model.requests.lock().unwrap()[1];
    assert!(second.messages.iter().any(|m| m.role == Role::Tool));
}

#[tokio::test]
async fn multiple_tool_calls_paired_in_request_order() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedModel::calls(&[
            ("call_a", "get_current_time", "{}"),
            ("call_b", "get_current_date", "{}"),
        ]),
        ScriptedModel::text("Noted."),
    ]));
    let mut engine = engine_with(model.clone(), clock_registry());

    engine.handle_turn("time and date please").await;

    let messages = engine.context().messages();
    let results: Vec<&Message> = messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tool_call_id.as_deref(), Some("call_a"));
    assert_eq!(results[1].tool_call_id.as_deref(), Some("call_b"));

    // Both results preceded the second model call
    let second = &model.requests.lock().unwrap()[1];
    let tool_results_seen = second
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .count();
    assert_eq!(tool_results_seen, 2);
}

#[tokio::test]
async fn unknown_tool_recovers_conversationally() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedModel::calls(&[("call_1", "delete_universe", "{}")]),
        ScriptedModel::text("That tool doesn't exist, sorry."),
    ]));
    let mut engine = engine_with(model, clock_registry());

    let outcome = engine.handle_turn("do something impossible").await;
    assert_eq!(outcome.reply, "That tool doesn't exist, sorry.");

    let messages = engine.context().messages();
    let failure = messages.iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(failure.content.contains("unknown tool"));
}

#[tokio::test]
async fn transient_failures_retried_to_success() {
    let model = Arc::new(
        ScriptedModel::new(vec![ScriptedModel::text("Recovered fine.")])
            .with_transient_failures(2),
    );

    let mut engine = Engine::new(
        model.clone(),
        "test-model",
        Arc::new(ToolRegistry::new()),
        ContextStore::new("sys", 50),
        SessionState::new("retry-session"),
    )
    .with_retry_policy(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    });

    let outcome = engine.handle_turn("are you there?").await;
    assert_eq!(outcome.reply, "Recovered fine.");
    assert!(!outcome.degraded);
    // 2 failures + 1 success
    assert_eq!(model.request_count(), 3);
}

#[tokio::test]
async fn retries_exhausted_becomes_degraded_reply() {
    let model = Arc::new(
        ScriptedModel::new(vec![ScriptedModel::text("never served")])
            .with_transient_failures(10),
    );

    let mut engine = Engine::new(
        model.clone(),
        "test-model",
        Arc::new(ToolRegistry::new()),
        ContextStore::new("sys", 50),
        SessionState::new("retry-session"),
    )
    .with_retry_policy(RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    });

    let outcome = engine.handle_turn("hello?").await;
    assert!(outcome.degraded);
    assert_eq!(model.request_count(), 2); // max_retries + 1
}

#[tokio::test]
async fn preference_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let session_id = "restart-session";

    {
        let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(dir.path()));
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text(
            "Concise it is.",
        )]));
        let mut engine = Engine::new(
            model,
            "test-model",
            Arc::new(ToolRegistry::new()),
            ContextStore::new("sys", 50),
            SessionState::new(session_id),
        )
        .with_retry_policy(RetryPolicy::none())
        .with_state_store(store);

        let outcome = engine.handle_turn("please keep it brief from now on").await;
        assert!(!outcome.degraded);
        assert_eq!(engine.state().get_preference("style"), Some("concise"));
    }

    // Simulated restart: a fresh store over the same directory
    let store = FileStateStore::new(dir.path());
    let restored = Engine::load_state(&store, session_id).await;
    assert_eq!(restored.get_preference("style"), Some("concise"));
    assert_eq!(restored.turns, 1);
}

#[tokio::test]
async fn unknown_session_loads_default_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());

    let state = Engine::load_state(&store, "brand-new").await;
    assert_eq!(state.session_id, "brand-new");
    assert_eq!(state.turns, 0);
    assert!(state.preferences.is_empty());
}

#[tokio::test]
async fn chain_depth_guard_emits_generic_reply() {
    let script: Vec<ChatResponse> = (0..20)
        .map(|i| {
            let id = format!("call_{i}");
            ScriptedModel::calls(&[(id.as_str(), "get_current_time", "{}")])
        })
        .collect();
    let model = Arc::new(ScriptedModel::new(script));
    let mut engine = engine_with(model.clone(), clock_registry()).with_max_tool_depth(4);

    let outcome = engine.handle_turn("never stop calling tools").await;

    assert!(outcome.degraded);
    assert!(outcome.reply.contains("after several steps"));
    assert_eq!(model.request_count(), 4);

    // Every requested call still has exactly one paired result
    let messages = engine.context().messages();
    for msg in messages {
        for call in &msg.tool_calls {
            let paired = messages
                .iter()
                .filter(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()))
                .count();
            assert_eq!(paired, 1, "tool call {} should have one result", call.id);
        }
    }
}
