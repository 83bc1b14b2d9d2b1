//! Provider traits — the abstractions over the three external services.
//!
//! Sotto talks to exactly three kinds of providers, each behind its own
//! trait so the engine never names a concrete backend:
//!
//! - [`LanguageModel`] — chat completion, optionally as a token stream
//! - [`SpeechToText`] — audio in, transcript + detected language out
//! - [`SpeechSynthesis`] — text in, audio bytes out
//!
//! Implementations: OpenAI-compatible HTTP endpoints (llama.cpp server,
//! Ollama, whisper-server, local TTS servers) in `sotto-providers`.

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "qwen2.5-7b-instruct")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ChatRequest {
    /// A request with default sampling settings.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
            stop: Vec::new(),
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls (complete, delivered with the final chunk)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The result of speech recognition over one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// The recognized text
    pub text: String,

    /// Detected language (BCP-47-ish code, e.g. "en"), if the provider
    /// reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// The core language-model trait.
///
/// The engine calls `complete()` or `stream()` without knowing which backend
/// is being used — pure polymorphism.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name for this provider (e.g., "llama-server").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ChatRequest)
    -> std::result::Result<ChatResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single chunk.
    async fn stream(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}

/// Speech recognition over a finished utterance.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// A human-readable name for this provider (e.g., "whisper-server").
    fn name(&self) -> &str;

    /// Transcribe a buffer of encoded audio. `language_hint` constrains
    /// detection when the caller already knows the language.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        language_hint: Option<&str>,
    ) -> std::result::Result<Transcript, ProviderError>;
}

/// Text-to-speech synthesis.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Synthesize the given text, returning encoded audio bytes.
    async fn synthesize(&self, text: &str) -> std::result::Result<Vec<u8>, ProviderError>;
}
