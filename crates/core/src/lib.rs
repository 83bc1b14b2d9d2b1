//! # Sotto Core
//!
//! Domain types, traits, and error definitions for the Sotto voice assistant
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the language
//! model, the speech-recognition and speech-synthesis providers, tool
//! handlers, and the conversation-state store. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Classify, ContextError, Error, ErrorClass, ProviderError, Result, StateError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role, SessionId};
pub use provider::{
    ChatRequest, ChatResponse, LanguageModel, SpeechSynthesis, SpeechToText, StreamChunk,
    ToolDefinition, Transcript, Usage,
};
pub use state::{SessionState, StateStore};
pub use tool::{Tool, ToolCall, ToolOutcome, ToolOutput, ToolRegistry};
