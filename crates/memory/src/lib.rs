//! Conversation-state persistence backends for Sotto.

pub mod file;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileStateStore;
pub use in_memory::InMemoryStateStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStateStore;
