//! File-based state store — one JSON document per session.
//!
//! Storage location: `<dir>/<session_id>.json`
//!
//! Simple, portable, human-inspectable, and requires zero external
//! dependencies. Writes go to a temporary file first and are renamed into
//! place so a crash mid-write never corrupts the previous record.

use async_trait::async_trait;
use sotto_core::error::StateError;
use sotto_core::state::{SessionState, StateStore};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file-backed session-state store.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        // Session IDs are UUIDs in practice, but never trust them as paths
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn read_state(path: &Path) -> Option<SessionState> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted state file");
                None
            }
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, state: &SessionState) -> Result<(), StateError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StateError::Storage(format!("Failed to create state directory: {e}")))?;

        let path = self.path_for(&state.session_id);
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| StateError::Storage(format!("Failed to write state file: {e}")))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| StateError::Storage(format!("Failed to commit state file: {e}")))?;

        debug!(session = %state.session_id, path = %path.display(), "Saved conversation state");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StateError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Self::read_state(&path))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StateError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .map_err(|e| StateError::Storage(format!("Failed to delete state file: {e}")))?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<String>, StateError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(_) => return Ok(Vec::new()), // directory not created yet
        };

        let mut sessions: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        sessions.sort();
        Ok(sessions)
    }
}
