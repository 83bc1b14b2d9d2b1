//! In-memory state store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use sotto_core::error::StateError;
use sotto_core::state::{SessionState, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A state store that keeps everything in a HashMap.
/// Nothing survives a restart; that is the point.
#[derive(Default)]
pub struct InMemoryStateStore {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, state: &SessionState) -> Result<(), StateError> {
        self.sessions
            .write()
            .await
            .insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StateError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StateError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, StateError> {
        let mut sessions: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        sessions.sort();
        Ok(sessions)
    }
}
