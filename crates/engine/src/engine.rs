//! The orchestration engine — one turn's state machine.
//!
//! Per turn: append the user message, snapshot the bounded context, ask the
//! model to decide; either it answers directly or it requests tools, which
//! are dispatched sequentially in the order requested (later calls may
//! depend on earlier effects), their results appended, and the model asked
//! again. A fixed depth bound prevents infinite tool chains. Every provider
//! failure that survives the resilience layer becomes a spoken, apologetic
//! reply — an exception never escapes a turn.
//!
//! One engine instance owns one session's context and state exclusively;
//! different sessions run on independent engines sharing only the
//! (read-only after startup) tool registry.

use crate::context::ContextStore;
use crate::segment::UtteranceStream;
use crate::topics;
use chrono::Utc;
use sotto_config::ToolGating;
use sotto_core::error::ProviderError;
use sotto_core::event::{DomainEvent, EventBus};
use sotto_core::message::Message;
use sotto_core::provider::{
    ChatRequest, LanguageModel, SpeechSynthesis, SpeechToText, Transcript,
};
use sotto_core::state::{SessionState, StateStore};
use sotto_core::tool::{ToolCall, ToolRegistry};
use sotto_providers::retry::{RetryPolicy, call_with_resilience};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

const DEGRADED_REPLY: &str =
    "I'm having trouble reaching my language model right now. Please try again in a moment.";
const DEPTH_EXCEEDED_REPLY: &str =
    "I wasn't able to complete this request after several steps. Could you rephrase or simplify it?";
const CANCELLED_REPLY: &str = "This request was cancelled before it finished.";
const UNHEARD_REPLY: &str = "I couldn't make out what you said. Could you repeat that?";

/// A synthesized utterance: the text spoken and its audio.
#[derive(Debug, Clone)]
pub struct AudioUnit {
    pub text: String,
    pub audio: Vec<u8>,
}

/// Cooperative cancellation for an in-flight turn.
///
/// Checked between state-machine transitions; cancellation never leaves a
/// dangling assistant tool-call message without results.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What one completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The final reply text.
    pub reply: String,
    /// Audio produced during the turn (per streamed unit, or one unit for
    /// the whole reply). Empty when no synthesis provider is configured.
    pub audio: Vec<AudioUnit>,
    /// The transcript, when the turn started from audio.
    pub transcript: Option<Transcript>,
    /// Model decision rounds used.
    pub iterations: u32,
    /// Tool calls dispatched.
    pub tool_invocations: usize,
    /// Whether the reply came from a degraded path (provider failure,
    /// interrupted stream, depth exhaustion).
    pub degraded: bool,
    /// Whether the turn was cancelled mid-flight.
    pub cancelled: bool,
}

impl TurnOutcome {
    fn plain(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            audio: Vec::new(),
            transcript: None,
            iterations: 0,
            tool_invocations: 0,
            degraded: false,
            cancelled: false,
        }
    }
}

/// The per-session orchestration engine.
pub struct Engine {
    llm: Arc<dyn LanguageModel>,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn SpeechSynthesis>>,
    tools: Arc<ToolRegistry>,
    context: ContextStore,
    state: SessionState,
    state_store: Option<Arc<dyn StateStore>>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_tool_depth: u32,
    snapshot_window: usize,
    streaming: bool,
    tool_gating: ToolGating,
    retry: RetryPolicy,

    events: Arc<EventBus>,
    cancel: CancelFlag,

    debounce: std::time::Duration,
    last_saved: Option<Instant>,
}

impl Engine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        context: ContextStore,
        state: SessionState,
    ) -> Self {
        Self {
            llm,
            stt: None,
            tts: None,
            tools,
            context,
            state,
            state_store: None,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_tool_depth: 5,
            snapshot_window: 16,
            streaming: false,
            tool_gating: ToolGating::Always,
            retry: RetryPolicy::default(),
            events: Arc::new(EventBus::default()),
            cancel: CancelFlag::new(),
            debounce: std::time::Duration::ZERO,
            last_saved: None,
        }
    }

    pub fn with_speech_to_text(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = Some(stt);
        self
    }

    pub fn with_speech_synthesis(mut self, tts: Arc<dyn SpeechSynthesis>) -> Self {
        self.tts = Some(tts);
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_tool_depth(mut self, depth: u32) -> Self {
        self.max_tool_depth = depth.max(1);
        self
    }

    pub fn with_snapshot_window(mut self, window: usize) -> Self {
        self.snapshot_window = window.max(1);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_tool_gating(mut self, gating: ToolGating) -> Self {
        self.tool_gating = gating;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_state_debounce(mut self, debounce: std::time::Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Use an externally-owned cancel flag (e.g. tied to a session's
    /// shutdown) instead of the engine's internal one.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// A handle that cancels the in-flight turn when triggered.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// The session's conversation state (in-memory authoritative copy).
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The session's bounded context store.
    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Load a session's state from the store, or start fresh. "Not found"
    /// and storage failures both yield a default state; the failure is only
    /// logged.
    pub async fn load_state(store: &dyn StateStore, session_id: &str) -> SessionState {
        match store.load(session_id).await {
            Ok(Some(state)) => {
                debug!(session = %session_id, turns = state.turns, "Restored conversation state");
                state
            }
            Ok(None) => SessionState::new(session_id),
            Err(e) => {
                warn!(session = %session_id, error = %e, "Failed to load state, starting fresh");
                SessionState::new(session_id)
            }
        }
    }

    /// Process one spoken utterance end to end: transcribe, then run the
    /// text turn.
    pub async fn handle_audio_turn(&mut self, audio: Vec<u8>) -> TurnOutcome {
        let Some(stt) = self.stt.clone() else {
            let mut outcome = TurnOutcome::plain(UNHEARD_REPLY);
            outcome.degraded = true;
            return outcome;
        };

        let language = self.state.get_preference("language").map(String::from);
        let transcript = call_with_resilience(&self.retry, || {
            let stt = stt.clone();
            let audio = audio.clone();
            let language = language.clone();
            async move { stt.transcribe(audio, language.as_deref()).await }
        })
        .await;

        match transcript {
            Ok(transcript) if !transcript.text.is_empty() => {
                if let Some(lang) = &transcript.language {
                    self.state.set_preference("language", lang);
                }
                let mut outcome = self.handle_turn(&transcript.text).await;
                outcome.transcript = Some(transcript);
                outcome
            }
            Ok(_) => {
                let mut outcome = TurnOutcome::plain(UNHEARD_REPLY);
                outcome.degraded = true;
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Speech recognition failed");
                self.publish_error("speech_to_text", &e);
                let mut outcome = TurnOutcome::plain(UNHEARD_REPLY);
                outcome.degraded = true;
                outcome
            }
        }
    }

    /// Process one user turn: decide → (optionally call tools) → respond.
    ///
    /// Never fails: provider errors, unknown tools, depth exhaustion, and
    /// cancellation all resolve into a user-visible reply.
    pub async fn handle_turn(&mut self, user_text: &str) -> TurnOutcome {
        self.events.publish(DomainEvent::TurnStarted {
            session_id: self.state.session_id.clone(),
            timestamp: Utc::now(),
        });

        if let Err(e) = self.context.append(Message::user(user_text)) {
            warn!(error = %e, "Rejected malformed user message");
        }
        self.context.prune().await;

        let offer_tools = !self.tools.is_empty()
            && match self.tool_gating {
                ToolGating::Always => true,
                ToolGating::Heuristic => topics::wants_tools(user_text),
            };

        let mut outcome = if self.streaming && !offer_tools {
            self.streamed_turn().await
        } else {
            self.decision_loop(offer_tools).await
        };

        // Finalized: update derived state and persist, then voice the reply
        // if streaming didn't already.
        self.finalize_state(user_text, &outcome.reply).await;

        if outcome.audio.is_empty()
            && !outcome.reply.is_empty()
            && !outcome.cancelled
            && let Some(audio) = self.synthesize(&outcome.reply).await
        {
            outcome.audio.push(AudioUnit {
                text: outcome.reply.clone(),
                audio,
            });
        }

        self.cancel.clear();
        outcome
    }

    /// The non-streaming decide → tools → decide loop.
    async fn decision_loop(&mut self, offer_tools: bool) -> TurnOutcome {
        let mut outcome = TurnOutcome::plain("");
        let definitions = if offer_tools {
            self.tools.definitions()
        } else {
            Vec::new()
        };

        loop {
            outcome.iterations += 1;

            if outcome.iterations > self.max_tool_depth {
                warn!(
                    session = %self.state.session_id,
                    depth = self.max_tool_depth,
                    "Tool-call chain reached maximum depth"
                );
                outcome.reply = DEPTH_EXCEEDED_REPLY.into();
                outcome.degraded = true;
                self.append_assistant(DEPTH_EXCEEDED_REPLY).await;
                return outcome;
            }

            if self.cancel.is_cancelled() {
                outcome.reply = CANCELLED_REPLY.into();
                outcome.cancelled = true;
                self.append_assistant(CANCELLED_REPLY).await;
                return outcome;
            }

            let mut request =
                ChatRequest::new(self.model.clone(), self.context.snapshot(self.snapshot_window));
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = definitions.clone();

            let llm = self.llm.clone();
            let response = call_with_resilience(&self.retry, || {
                let llm = llm.clone();
                let request = request.clone();
                async move { llm.complete(request).await }
            })
            .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Model call failed after resilience policy");
                    self.publish_error("language_model", &e);
                    outcome.reply = DEGRADED_REPLY.into();
                    outcome.degraded = true;
                    self.append_assistant(DEGRADED_REPLY).await;
                    return outcome;
                }
            };

            if let Some(usage) = &response.usage {
                self.events.publish(DomainEvent::ResponseGenerated {
                    session_id: self.state.session_id.clone(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            // Direct reply — we are done.
            if response.message.tool_calls.is_empty() {
                outcome.reply = response.message.content.clone();
                if self.context.append(response.message).is_ok() {
                    self.context.prune().await;
                }
                return outcome;
            }

            // Tool invocations pending: append the assistant message first,
            // then exactly one result per requested call, in request order.
            let calls = response.message.tool_calls.clone();
            debug!(count = calls.len(), "Executing requested tool calls");
            let _ = self.context.append(response.message);

            for (i, call) in calls.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    // Unexecuted calls still get results so no assistant
                    // tool-call message is left dangling.
                    for skipped in &calls[i..] {
                        let _ = self.context.append(Message::tool_result(
                            &skipped.id,
                            "Error: cancelled before execution",
                        ));
                    }
                    outcome.reply = CANCELLED_REPLY.into();
                    outcome.cancelled = true;
                    self.append_assistant(CANCELLED_REPLY).await;
                    return outcome;
                }

                let tool_call = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: serde_json::from_str(&call.arguments)
                        .unwrap_or(serde_json::Value::Null),
                };

                let started = Instant::now();
                let result = self.tools.dispatch(&tool_call).await;
                outcome.tool_invocations += 1;

                self.events.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: result.success,
                    duration_ms: started.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                });

                let content = if result.success {
                    result.output
                } else {
                    format!("Error: {}", result.output)
                };
                let _ = self.context.append(Message::tool_result(&call.id, content));
            }
            self.context.prune().await;
            // Loop back so the model can read the results and decide again.
        }
    }

    /// The streaming path for tool-free turns: segment the token stream
    /// into utterance units and synthesize each one as soon as it lands.
    async fn streamed_turn(&mut self) -> TurnOutcome {
        let mut outcome = TurnOutcome::plain("");
        outcome.iterations = 1;

        let mut request =
            ChatRequest::new(self.model.clone(), self.context.snapshot(self.snapshot_window));
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let llm = self.llm.clone();
        let rx = call_with_resilience(&self.retry, || {
            let llm = llm.clone();
            let request = request.clone();
            async move { llm.stream(request).await }
        })
        .await;

        let rx = match rx {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "Model stream failed after resilience policy");
                self.publish_error("language_model", &e);
                outcome.reply = DEGRADED_REPLY.into();
                outcome.degraded = true;
                self.append_assistant(DEGRADED_REPLY).await;
                return outcome;
            }
        };

        let mut stream = UtteranceStream::new(rx);
        let mut parts: Vec<String> = Vec::new();

        while let Some(item) = stream.next_unit().await {
            match item {
                Ok(unit) => {
                    if let Some(audio) = self.synthesize(unit.trim()).await {
                        outcome.audio.push(AudioUnit {
                            text: unit.trim().to_string(),
                            audio,
                        });
                    }
                    parts.push(unit);
                }
                Err(e) => {
                    // The partial buffer was already flushed as a unit; the
                    // spoken prefix stands, the turn is marked degraded.
                    warn!(error = %e, "Stream interrupted mid-reply");
                    self.publish_error("language_model_stream", &e);
                    outcome.degraded = true;
                    break;
                }
            }
        }

        let text = parts.concat().trim().to_string();
        if text.is_empty() {
            outcome.reply = DEGRADED_REPLY.into();
            outcome.degraded = true;
            self.append_assistant(DEGRADED_REPLY).await;
            return outcome;
        }

        if let Some(usage) = stream.usage() {
            self.events.publish(DomainEvent::ResponseGenerated {
                session_id: self.state.session_id.clone(),
                model: self.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }

        outcome.reply = text.clone();
        self.append_assistant(&text).await;
        outcome
    }

    async fn append_assistant(&mut self, content: &str) {
        if self.context.append(Message::assistant(content)).is_ok() {
            self.context.prune().await;
        }
    }

    /// Synthesize text to audio through the resilience layer. Synthesis
    /// failures are logged and cost the audio, never the reply.
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        let tts = self.tts.clone()?;
        if text.is_empty() {
            return None;
        }

        let result = call_with_resilience(&self.retry, || {
            let tts = tts.clone();
            let text = text.to_string();
            async move { tts.synthesize(&text).await }
        })
        .await;

        match result {
            Ok(audio) => {
                self.events.publish(DomainEvent::UtteranceSynthesized {
                    chars: text.len(),
                    audio_bytes: audio.len(),
                    timestamp: Utc::now(),
                });
                Some(audio)
            }
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed, continuing without audio");
                self.publish_error("speech_synthesis", &e);
                None
            }
        }
    }

    /// Update topics/preferences from the completed turn and persist.
    /// Persistence failures are logged; in-memory state stays authoritative.
    async fn finalize_state(&mut self, user_text: &str, reply: &str) {
        self.state.record_topics(topics::extract_topics(user_text));
        self.state.record_topics(topics::extract_topics(reply));
        for (key, value) in topics::extract_preferences(user_text) {
            self.state.set_preference(key, value);
        }
        self.state.touch();

        let Some(store) = self.state_store.clone() else {
            return;
        };

        if !self.debounce.is_zero()
            && let Some(last) = self.last_saved
            && last.elapsed() < self.debounce
        {
            return;
        }

        match store.save(&self.state).await {
            Ok(()) => {
                self.last_saved = Some(Instant::now());
                self.events.publish(DomainEvent::StateSaved {
                    session_id: self.state.session_id.clone(),
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(session = %self.state.session_id, error = %e, "Failed to persist state");
                self.events.publish(DomainEvent::ErrorOccurred {
                    context: "state_store".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn publish_error(&self, context: &str, error: &ProviderError) {
        self.events.publish(DomainEvent::ErrorOccurred {
            context: context.into(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}
