//! Connection layer under [`crate::repo::SqliteStore`].
//!
//! # Responsibility
//! - Hand out connections whose `records` table is at the latest schema.
//! - Create the directory that holds a record database file.
//!
//! # Invariants
//! - The records schema version lives in `PRAGMA user_version`.
//! - A file whose schema is newer than this build is refused, never rewritten.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure to reach or prepare a record database.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The parent directory of a database file could not be created.
    Directory { path: PathBuf, source: io::Error },
    /// The file was written by a build with more record migrations.
    SchemaTooNew { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "record database: {err}"),
            Self::Directory { path, source } => {
                write!(f, "cannot create record directory {}: {source}", path.display())
            }
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "records schema v{found} is ahead of this build (latest v{supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Directory { source, .. } => Some(source),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
