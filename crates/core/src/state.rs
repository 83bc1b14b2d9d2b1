//! Conversation state — derived, longer-lived facts about a session.
//!
//! Independent of the raw message history: topics, preferences, and session
//! metadata survive context pruning and process restarts. The [`StateStore`]
//! trait abstracts the persistence backend (file, SQLite, in-memory).

use crate::error::StateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How many recent topics to keep in insertion order.
const MAX_RECENT_TOPICS: usize = 20;

/// Derived conversational state for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// The session this state belongs to
    pub session_id: String,

    /// Topic → occurrence count, accumulated across turns
    #[serde(default)]
    pub topics: BTreeMap<String, u32>,

    /// Most recently touched topics, oldest first, bounded
    #[serde(default)]
    pub recent_topics: Vec<String>,

    /// User preferences, last-write-wins
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,

    /// When this session was first seen
    pub created_at: DateTime<Utc>,

    /// When this session last completed a turn
    pub last_active_at: DateTime<Utc>,

    /// Completed turns in this session's lifetime
    #[serde(default)]
    pub turns: u64,
}

impl SessionState {
    /// Fresh state for a new session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            topics: BTreeMap::new(),
            recent_topics: Vec::new(),
            preferences: BTreeMap::new(),
            created_at: now,
            last_active_at: now,
            turns: 0,
        }
    }

    /// Merge extracted topic terms into the accumulated sets.
    pub fn record_topics<I, S>(&mut self, terms: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for term in terms {
            let term = term.into();
            if term.is_empty() {
                continue;
            }
            *self.topics.entry(term.clone()).or_insert(0) += 1;
            self.recent_topics.retain(|t| t != &term);
            self.recent_topics.push(term);
            if self.recent_topics.len() > MAX_RECENT_TOPICS {
                self.recent_topics.remove(0);
            }
        }
    }

    /// Set a preference (last-write-wins).
    pub fn set_preference(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.preferences.insert(key.into(), value.into());
    }

    /// Read a preference back.
    pub fn get_preference(&self, key: &str) -> Option<&str> {
        self.preferences.get(key).map(|v| v.as_str())
    }

    /// Record that a turn completed just now.
    pub fn touch(&mut self) {
        self.turns += 1;
        self.last_active_at = Utc::now();
    }

    /// The most frequent topics, descending by count.
    pub fn top_topics(&self, limit: usize) -> Vec<(&str, u32)> {
        let mut ranked: Vec<(&str, u32)> =
            self.topics.iter().map(|(t, c)| (t.as_str(), *c)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// A one-line summary suitable for diagnostics or prompt injection.
    pub fn context_summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.recent_topics.is_empty() {
            let recent: Vec<&str> = self
                .recent_topics
                .iter()
                .rev()
                .take(5)
                .map(|s| s.as_str())
                .collect();
            parts.push(format!("Recent topics: {}", recent.join(", ")));
        }
        if !self.preferences.is_empty() {
            let prefs: Vec<String> = self
                .preferences
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            parts.push(format!("Preferences: {}", prefs.join(", ")));
        }
        if parts.is_empty() {
            "No conversation context yet".into()
        } else {
            parts.join(" | ")
        }
    }
}

/// The persistence backend for [`SessionState`].
///
/// Implementations: file (one JSON document per session), SQLite, in-memory.
/// `load` returns `Ok(None)` for an unknown session — "not found" is never
/// an error.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "file", "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist the given state, overwriting any previous record.
    async fn save(&self, state: &SessionState) -> std::result::Result<(), StateError>;

    /// Load the state for a session, or `None` if no record exists.
    async fn load(&self, session_id: &str)
    -> std::result::Result<Option<SessionState>, StateError>;

    /// Delete a session's record. Returns whether anything was removed.
    async fn delete(&self, session_id: &str) -> std::result::Result<bool, StateError>;

    /// List all known session IDs.
    async fn list(&self) -> std::result::Result<Vec<String>, StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_accumulate_counts() {
        let mut state = SessionState::new("s1");
        state.record_topics(["files", "time"]);
        state.record_topics(["files"]);

        assert_eq!(state.topics.get("files"), Some(&2));
        assert_eq!(state.topics.get("time"), Some(&1));
        // "files" was re-touched, so it is the most recent
        assert_eq!(state.recent_topics.last().map(|s| s.as_str()), Some("files"));
    }

    #[test]
    fn recent_topics_bounded() {
        let mut state = SessionState::new("s1");
        for i in 0..30 {
            state.record_topics([format!("topic{i}")]);
        }
        assert_eq!(state.recent_topics.len(), 20);
        assert_eq!(state.recent_topics[0], "topic10");
    }

    #[test]
    fn preferences_last_write_wins() {
        let mut state = SessionState::new("s1");
        state.set_preference("style", "verbose");
        state.set_preference("style", "concise");
        assert_eq!(state.get_preference("style"), Some("concise"));
        assert_eq!(state.get_preference("missing"), None);
    }

    #[test]
    fn touch_advances_activity() {
        let mut state = SessionState::new("s1");
        let before = state.last_active_at;
        state.touch();
        assert_eq!(state.turns, 1);
        assert!(state.last_active_at >= before);
    }

    #[test]
    fn top_topics_ranked_by_count() {
        let mut state = SessionState::new("s1");
        state.record_topics(["a", "b", "b", "c", "c", "c"]);
        let top = state.top_topics(2);
        assert_eq!(top, vec![("c", 3), ("b", 2)]);
    }

    #[test]
    fn context_summary_mentions_topics_and_preferences() {
        let mut state = SessionState::new("s1");
        state.record_topics(["weather"]);
        state.set_preference("theme", "dark");
        let summary = state.context_summary();
        assert!(summary.contains("weather"));
        assert!(summary.contains("theme=dark"));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut state = SessionState::new("s1");
        state.record_topics(["code"]);
        state.set_preference("style", "concise");
        state.touch();

        let json = serde_json::to_string(&state).unwrap();
        let restored: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.session_id, "s1");
        assert_eq!(restored.get_preference("style"), Some("concise"));
        assert_eq!(restored.turns, 1);
    }
}
