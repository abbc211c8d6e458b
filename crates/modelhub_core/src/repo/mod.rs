//! Record persistence backends behind one store contract.
//!
//! # Responsibility
//! - Define the [`RecordStore`] contract used by the registry.
//! - Provide in-memory, JSON-file, and SQLite implementations.
//!
//! # Invariants
//! - Stores know model names and uids only; typing stays in the model layer.

pub mod json_repo;
pub mod memory_repo;
pub mod record_repo;
pub mod sqlite_repo;

pub use json_repo::JsonFileStore;
pub use memory_repo::MemoryStore;
pub use record_repo::{record_uid, Record, RecordStore, StoreError, StoreResult};
pub use sqlite_repo::SqliteStore;
