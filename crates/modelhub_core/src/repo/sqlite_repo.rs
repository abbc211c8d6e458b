//! SQLite-backed record store.
//!
//! # Responsibility
//! - Keep one JSON body per `(model, uid)` in the `records` table.
//! - Represent soft deletes as tombstoned rows (`is_deleted = 1`).
//!
//! # Invariants
//! - A live row and a tombstone for the same uid may coexist, mirroring the
//!   file store's `<uid>.json` / `-<uid>.json` pair.
//! - Bodies never contain the `uid` key.

use super::record_repo::{body_of, record_uid, with_uid, Record, RecordStore, StoreError, StoreResult};
use crate::config::RuntimeConfig;
use crate::db::{open_db, open_db_in_memory};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// File name used inside `database_path` by [`SqliteStore::from_config`].
pub const SQLITE_FILE_NAME: &str = "records.sqlite3";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wraps a connection that already went through migrations.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    pub fn from_config(config: &RuntimeConfig) -> StoreResult<Self> {
        Self::open(config.database_path.join(SQLITE_FILE_NAME))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn row_exists(&self, model: &str, uid: u64, deleted: bool) -> StoreResult<bool> {
        let found = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM records WHERE model = ?1 AND uid = ?2 AND is_deleted = ?3
            );",
            params![model, sql_uid(uid)?, deleted],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(found)
    }
}

fn sql_uid(uid: u64) -> StoreResult<i64> {
    i64::try_from(uid).map_err(|_| StoreError::InvalidData(format!("uid {uid} out of range")))
}

fn missing(model: &str, uid: u64) -> StoreError {
    StoreError::Missing {
        model: model.to_string(),
        uid,
    }
}

impl RecordStore for SqliteStore {
    fn exists(&self, model: &str, uid: u64, soft: bool) -> StoreResult<bool> {
        self.row_exists(model, uid, soft)
    }

    fn create(&self, model: &str, record: &Record) -> StoreResult<()> {
        let uid = record_uid(record)?;
        if self.row_exists(model, uid, false)? {
            return Err(StoreError::AlreadyExists {
                model: model.to_string(),
                uid,
            });
        }
        let body = serde_json::to_string(&body_of(record))?;
        self.conn.execute(
            "INSERT INTO records (model, uid, is_deleted, body) VALUES (?1, ?2, 0, ?3);",
            params![model, sql_uid(uid)?, body],
        )?;
        info!("event=record_create module=repo status=ok store=sqlite model={model} uid={uid}");
        Ok(())
    }

    fn read(&self, model: &str, uid: u64) -> StoreResult<Record> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM records WHERE model = ?1 AND uid = ?2 AND is_deleted = 0;",
                params![model, sql_uid(uid)?],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| missing(model, uid))?;
        let body: Record = serde_json::from_str(&body)?;
        Ok(with_uid(body, uid))
    }

    fn update(&self, model: &str, record: &Record) -> StoreResult<()> {
        let uid = record_uid(record)?;
        let body = serde_json::to_string(&body_of(record))?;
        let changed = self.conn.execute(
            "UPDATE records
             SET body = ?3, updated_at = CAST(strftime('%s', 'now') AS INTEGER) * 1000
             WHERE model = ?1 AND uid = ?2 AND is_deleted = 0;",
            params![model, sql_uid(uid)?, body],
        )?;
        if changed == 0 {
            return Err(missing(model, uid));
        }
        info!("event=record_update module=repo status=ok store=sqlite model={model} uid={uid}");
        Ok(())
    }

    fn delete(&self, model: &str, uid: u64, soft: bool) -> StoreResult<()> {
        if !self.row_exists(model, uid, false)? {
            return Err(missing(model, uid));
        }
        if soft {
            if self.row_exists(model, uid, true)? {
                return Err(StoreError::DeleteConflict {
                    model: model.to_string(),
                    uid,
                });
            }
            self.conn.execute(
                "UPDATE records SET is_deleted = 1
                 WHERE model = ?1 AND uid = ?2 AND is_deleted = 0;",
                params![model, sql_uid(uid)?],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM records WHERE model = ?1 AND uid = ?2 AND is_deleted = 0;",
                params![model, sql_uid(uid)?],
            )?;
        }
        info!(
            "event=record_delete module=repo status=ok store=sqlite model={model} uid={uid} soft={soft}"
        );
        Ok(())
    }

    fn restore(&self, model: &str, uid: u64) -> StoreResult<()> {
        if self.row_exists(model, uid, false)? {
            return Err(StoreError::RestoreConflict {
                model: model.to_string(),
                uid,
            });
        }
        let changed = self.conn.execute(
            "UPDATE records SET is_deleted = 0
             WHERE model = ?1 AND uid = ?2 AND is_deleted = 1;",
            params![model, sql_uid(uid)?],
        )?;
        if changed == 0 {
            return Err(missing(model, uid));
        }
        info!("event=record_restore module=repo status=ok store=sqlite model={model} uid={uid}");
        Ok(())
    }

    fn list_all(&self, model: &str, include_soft_deleted: bool) -> StoreResult<Vec<u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT uid FROM records
             WHERE model = ?1 AND (?2 = 1 OR is_deleted = 0)
             ORDER BY uid ASC;",
        )?;
        let rows = stmt.query_map(params![model, include_soft_deleted], |row| {
            row.get::<_, i64>(0)
        })?;
        let mut uids = Vec::new();
        for row in rows {
            let uid = row?;
            uids.push(u64::try_from(uid).map_err(|_| {
                StoreError::InvalidData(format!("negative uid {uid} stored for {model}"))
            })?);
        }
        Ok(uids)
    }

    fn max_uid(&self, model: &str) -> StoreResult<u64> {
        let highest = self.conn.query_row(
            "SELECT COALESCE(MAX(uid), 0) FROM records WHERE model = ?1;",
            params![model],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(u64::try_from(highest).unwrap_or(0))
    }
}
