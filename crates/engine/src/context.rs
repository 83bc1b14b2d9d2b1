//! Bounded context store — the conversation log that never grows unbounded.
//!
//! Holds an ordered sequence of messages plus exactly one retained system
//! message (always first, never pruned). When the store exceeds its budget,
//! the oldest non-system, non-important messages are either discarded or —
//! when a summarizer strategy is configured and the conversation is long
//! enough — collapsed into a single synthetic system-role summary message
//! inserted immediately after the system message. A summarizer failure is
//! logged and degrades to plain discard, so a turn is never blocked on
//! summarization.

use crate::summarize::Summarizer;
use sotto_core::error::ContextError;
use sotto_core::message::{Message, Role};
use std::sync::Arc;
use tracing::{debug, warn};

const SUMMARY_PREFIX: &str = "Previous conversation summary: ";

/// A per-session, bounded conversation log.
///
/// Owned exclusively by one engine instance; no cross-session sharing.
pub struct ContextStore {
    messages: Vec<Message>,
    max_messages: usize,
    summarize_threshold: usize,
    important_slack: usize,
    summarizer: Option<Arc<dyn Summarizer>>,
    /// Whether messages[1] is a synthetic summary we inserted
    summary_present: bool,
}

impl ContextStore {
    /// Create a store seeded with one system message.
    pub fn new(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            max_messages: max_messages.max(2),
            summarize_threshold: max_messages.max(2) + max_messages.max(2) / 2,
            important_slack: 8,
            summarizer: None,
            summary_present: false,
        }
    }

    /// Message count at which summarization (rather than discard) kicks in.
    pub fn with_summarize_threshold(mut self, threshold: usize) -> Self {
        self.summarize_threshold = threshold.max(self.max_messages);
        self
    }

    /// How many important messages a snapshot may carry beyond its window.
    pub fn with_important_slack(mut self, slack: usize) -> Self {
        self.important_slack = slack;
        self
    }

    /// Attach a summarization strategy used during pruning.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Number of retained messages, including the system message.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the system message is always present
    }

    /// All retained messages, system message first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message. The only malformed shape an enum role still allows
    /// is a tool-result without its call linkage, which is rejected.
    pub fn append(&mut self, message: Message) -> Result<(), ContextError> {
        if message.role == Role::Tool && message.tool_call_id.is_none() {
            return Err(ContextError::DanglingToolResult);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Reset to a fresh log with only the system message.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
        self.summary_present = false;
    }

    /// The system message plus the most recent `window` messages.
    ///
    /// Important messages older than the window are carried along (most
    /// recent first), bounded by the configured slack factor.
    pub fn snapshot(&self, window: usize) -> Vec<Message> {
        let body = &self.messages[1..];
        let tail_start = body.len().saturating_sub(window);

        let mut snapshot = vec![self.messages[0].clone()];

        let mut carried: Vec<&Message> =
            body[..tail_start].iter().filter(|m| m.important).collect();
        if carried.len() > self.important_slack {
            carried.drain(..carried.len() - self.important_slack);
        }
        snapshot.extend(carried.into_iter().cloned());
        snapshot.extend(body[tail_start..].iter().cloned());
        snapshot
    }

    /// Enforce the size budget. No-op at or under budget; idempotent.
    pub async fn prune(&mut self) {
        if self.messages.len() <= self.max_messages {
            return;
        }
        let needed = self.messages.len() - self.max_messages;

        let long_enough = self.messages.len() >= self.summarize_threshold;
        if long_enough && self.summarizer.is_some() {
            // The inserted summary takes one slot, so the block must be one
            // larger to land exactly on budget.
            let block = self.select_block(needed + 1, true);
            let to_summarize: Vec<Message> =
                block.iter().map(|&i| self.messages[i].clone()).collect();

            let summarizer = self.summarizer.as_ref().cloned();
            if let Some(summarizer) = summarizer {
                match summarizer.summarize(&to_summarize).await {
                    Ok(summary) => {
                        for &i in block.iter().rev() {
                            self.messages.remove(i);
                        }
                        self.messages
                            .insert(1, Message::system(format!("{SUMMARY_PREFIX}{summary}")));
                        self.summary_present = true;
                        debug!(
                            summarized = to_summarize.len(),
                            retained = self.messages.len(),
                            "Pruned context with summarization"
                        );
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Summarization failed, falling back to discard");
                    }
                }
            }
        }

        let block = self.select_block(needed, false);
        for &i in block.iter().rev() {
            self.messages.remove(i);
        }
        debug!(
            dropped = block.len(),
            retained = self.messages.len(),
            "Pruned context by discard"
        );
    }

    /// Select up to `count` droppable message indices, oldest first.
    ///
    /// Non-important messages go first; important ones are exempt until no
    /// other candidates remain. The root system message never qualifies; an
    /// old synthetic summary qualifies only when it is being folded into a
    /// new one (`include_summary`).
    fn select_block(&self, count: usize, include_summary: bool) -> Vec<usize> {
        let mut block: Vec<usize> = Vec::with_capacity(count);

        if include_summary && self.summary_present {
            block.push(1);
        }

        let start = if self.summary_present { 2 } else { 1 };

        for (i, msg) in self.messages.iter().enumerate().skip(start) {
            if block.len() >= count {
                break;
            }
            if msg.role != Role::System && !msg.important {
                block.push(i);
            }
        }

        // Important messages are the last resort
        if block.len() < count {
            for (i, msg) in self.messages.iter().enumerate().skip(start) {
                if block.len() >= count {
                    break;
                }
                if msg.role != Role::System && msg.important {
                    block.push(i);
                }
            }
            block.sort_unstable();
        }

        block
    }
}
