//! SQLite state store — durable single-file persistence via sqlx.
//!
//! The whole `SessionState` is stored as a JSON document per row; the
//! schema stays trivial and the domain type remains the single source of
//! truth for its own shape.

use async_trait::async_trait;
use chrono::Utc;
use sotto_core::error::StateError;
use sotto_core::state::{SessionState, StateStore};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, warn};

/// A SQLite-backed session-state store.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (or create) the database at `db_path` and run migrations.
    pub async fn new(db_path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::Storage(format!("Failed to create state directory: {e}")))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StateError::Storage(format!("Failed to open state database: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        debug!(path = %db_path.display(), "SQLite state store ready");
        Ok(store)
    }

    /// An in-memory database, for tests.
    pub async fn in_memory() -> Result<Self, StateError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StateError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StateError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_state (
                session_id TEXT PRIMARY KEY,
                state      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, state: &SessionState) -> Result<(), StateError> {
        let json =
            serde_json::to_string(state).map_err(|e| StateError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT INTO session_state (session_id, state, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE
             SET state = excluded.state, updated_at = excluded.updated_at",
        )
        .bind(&state.session_id)
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Storage(format!("Save failed: {e}")))?;

        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, StateError> {
        let row = sqlx::query("SELECT state FROM session_state WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StateError::Storage(format!("Load failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let json: String = row.get(0);
        match serde_json::from_str(&json) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(session = %session_id, error = %e, "Skipping corrupted state row");
                Ok(None)
            }
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StateError> {
        let result = sqlx::query("DELETE FROM session_state WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Storage(format!("Delete failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<String>, StateError> {
        let rows = sqlx::query("SELECT session_id FROM session_state ORDER BY session_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StateError::Storage(format!("List failed: {e}")))?;

        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}
