//! The Sotto orchestration core.
//!
//! Everything between "the user said something" and "the system produced a
//! reply and possibly took an action" lives here:
//!
//! - [`context::ContextStore`] — bounded conversation memory with
//!   summarize-or-discard pruning
//! - [`segment`] — the streaming pipeline that turns token streams into
//!   sentence-sized utterance units for early speech synthesis
//! - [`topics`] — lightweight topic and preference extraction
//! - [`engine::Engine`] — the turn state machine composing all of the above

pub mod context;
pub mod engine;
pub mod segment;
pub mod summarize;
pub mod topics;

pub use context::ContextStore;
pub use engine::{AudioUnit, CancelFlag, Engine, TurnOutcome};
pub use segment::{SentenceSegmenter, UtteranceStream};
pub use summarize::{ModelSummarizer, Summarizer};
