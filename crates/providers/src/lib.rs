//! Provider implementations for Sotto.
//!
//! Everything that leaves the process goes through this crate: the
//! OpenAI-compatible language-model client, the HTTP speech-recognition and
//! speech-synthesis clients, and the resilience layer (classification-aware
//! retry with backoff, plus the degraded-configuration fallback) that wraps
//! all of them.

pub mod fallback;
pub mod openai_compat;
pub mod retry;
pub mod stt;
pub mod tts;

pub use fallback::FallbackModel;
pub use openai_compat::OpenAiCompatModel;
pub use retry::{RetryPolicy, call_with_resilience, delay_for_attempt};
pub use stt::HttpSpeechToText;
pub use tts::HttpSpeechSynthesis;
