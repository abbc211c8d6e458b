//! Record store contract shared by every persistence backend.
//!
//! # Responsibility
//! - Define the per-model CRUD contract the registry persists through.
//! - Keep backend details (files, SQL) out of the registry.
//!
//! # Invariants
//! - A record is a flat JSON object of database-tier values plus `uid`.
//! - A live record and its soft-deleted copy are tracked separately; `create`
//!   and `read` only see live records.
//! - Failures are surfaced, never retried.

use crate::db::DbError;
use serde_json::{Map, Value as Json};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type Record = Map<String, Json>;
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    AlreadyExists { model: String, uid: u64 },
    Missing { model: String, uid: u64 },
    DeleteConflict { model: String, uid: u64 },
    RestoreConflict { model: String, uid: u64 },
    Io(std::io::Error),
    Json(serde_json::Error),
    Db(DbError),
    InvalidData(String),
}

impl StoreError {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists { model, uid } => {
                write!(f, "cannot create {model}:{uid}, record already exists")
            }
            Self::Missing { model, uid } => write!(f, "record {model}:{uid} does not exist"),
            Self::DeleteConflict { model, uid } => write!(
                f,
                "cannot soft delete {model}:{uid}, a soft-deleted copy already exists"
            ),
            Self::RestoreConflict { model, uid } => {
                write!(f, "cannot restore {model}:{uid}, a live record exists")
            }
            Self::Io(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence collaborator keyed by model name.
pub trait RecordStore {
    /// `soft` asks about the soft-deleted copy instead of the live record.
    fn exists(&self, model: &str, uid: u64, soft: bool) -> StoreResult<bool>;
    fn create(&self, model: &str, record: &Record) -> StoreResult<()>;
    fn read(&self, model: &str, uid: u64) -> StoreResult<Record>;
    fn update(&self, model: &str, record: &Record) -> StoreResult<()>;
    fn delete(&self, model: &str, uid: u64, soft: bool) -> StoreResult<()>;
    fn restore(&self, model: &str, uid: u64) -> StoreResult<()>;
    /// Ascending uids of live records, plus soft-deleted ones on request.
    fn list_all(&self, model: &str, include_soft_deleted: bool) -> StoreResult<Vec<u64>>;
    /// Highest uid ever stored for `model` (live or soft-deleted), `0` if none.
    fn max_uid(&self, model: &str) -> StoreResult<u64>;

    /// Updates the live record when present, otherwise creates it.
    fn save(&self, model: &str, record: &Record) -> StoreResult<()> {
        let uid = record_uid(record)?;
        if self.exists(model, uid, false)? {
            self.update(model, record)
        } else {
            self.create(model, record)
        }
    }
}

/// Positive `uid` of a record.
pub fn record_uid(record: &Record) -> StoreResult<u64> {
    record
        .get("uid")
        .and_then(Json::as_u64)
        .filter(|uid| *uid > 0)
        .ok_or_else(|| StoreError::InvalidData("record has no positive uid".to_string()))
}

/// Record body without its `uid` key, as file and row bodies are stored.
pub(crate) fn body_of(record: &Record) -> Record {
    let mut body = record.clone();
    body.remove("uid");
    body
}

pub(crate) fn with_uid(mut body: Record, uid: u64) -> Record {
    body.insert("uid".to_string(), Json::from(uid));
    body
}
