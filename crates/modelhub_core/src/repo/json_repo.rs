//! One-JSON-file-per-record store.
//!
//! # Responsibility
//! - Persist each record as `<root>/<Model>/<uid>.json`.
//! - Keep soft-deleted records as `<root>/<Model>/-<uid>.json`.
//! - Snapshot the whole tree into a timestamped backup directory.
//!
//! # Invariants
//! - File bodies never contain the `uid` key; the file name carries it.
//! - A soft delete never overwrites an existing soft-deleted copy.
//! - A restore never overwrites a live record.

use super::record_repo::{body_of, record_uid, with_uid, Record, RecordStore, StoreError, StoreResult};
use crate::config::RuntimeConfig;
use chrono::Local;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

static RECORD_STEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?)([0-9]+)$").expect("valid record file regex"));

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Opens (creating when needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(
            "event=store_open module=repo status=ok store=json root={}",
            root.display()
        );
        Ok(Self { root })
    }

    pub fn from_config(config: &RuntimeConfig) -> StoreResult<Self> {
        Self::open(config.database_path.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_dir(&self, model: &str) -> PathBuf {
        self.root.join(model)
    }

    fn record_path(&self, model: &str, uid: u64, soft: bool) -> PathBuf {
        let file_name = if soft {
            format!("-{uid}.json")
        } else {
            format!("{uid}.json")
        };
        self.model_dir(model).join(file_name)
    }

    fn write_record(&self, path: &Path, record: &Record) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&body_of(record))?;
        fs::write(path, text)?;
        Ok(())
    }

    fn read_record(&self, path: &Path, uid: u64) -> StoreResult<Record> {
        let text = fs::read_to_string(path)?;
        let body: Record = serde_json::from_str(&text)?;
        Ok(with_uid(body, uid))
    }

    /// Copies the whole tree to `<backup_dir>/db_<timestamp>`; returns it.
    pub fn backup(&self, backup_dir: &Path) -> StoreResult<PathBuf> {
        let stamp = Local::now().format("%Y_%m_%d_%H_%M_%S_%6f");
        let target = backup_dir.join(format!("db_{stamp}"));
        copy_tree(&self.root, &target)?;
        info!(
            "event=store_backup module=repo status=ok store=json target={}",
            target.display()
        );
        Ok(target)
    }
}

fn copy_tree(from: &Path, to: &Path) -> StoreResult<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let destination = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), destination)?;
        }
    }
    Ok(())
}

impl RecordStore for JsonFileStore {
    fn exists(&self, model: &str, uid: u64, soft: bool) -> StoreResult<bool> {
        Ok(self.record_path(model, uid, soft).is_file())
    }

    fn create(&self, model: &str, record: &Record) -> StoreResult<()> {
        let uid = record_uid(record)?;
        let path = self.record_path(model, uid, false);
        if path.exists() {
            return Err(StoreError::AlreadyExists {
                model: model.to_string(),
                uid,
            });
        }
        self.write_record(&path, record)?;
        info!("event=record_create module=repo status=ok store=json model={model} uid={uid}");
        Ok(())
    }

    fn read(&self, model: &str, uid: u64) -> StoreResult<Record> {
        let path = self.record_path(model, uid, false);
        if !path.is_file() {
            return Err(StoreError::Missing {
                model: model.to_string(),
                uid,
            });
        }
        let record = self.read_record(&path, uid)?;
        debug!("event=record_read module=repo status=ok store=json model={model} uid={uid}");
        Ok(record)
    }

    fn update(&self, model: &str, record: &Record) -> StoreResult<()> {
        let uid = record_uid(record)?;
        let path = self.record_path(model, uid, false);
        if !path.is_file() {
            return Err(StoreError::Missing {
                model: model.to_string(),
                uid,
            });
        }
        self.write_record(&path, record)?;
        info!("event=record_update module=repo status=ok store=json model={model} uid={uid}");
        Ok(())
    }

    fn delete(&self, model: &str, uid: u64, soft: bool) -> StoreResult<()> {
        let live = self.record_path(model, uid, false);
        if !live.is_file() {
            return Err(StoreError::Missing {
                model: model.to_string(),
                uid,
            });
        }
        if soft {
            let copy = self.record_path(model, uid, true);
            if copy.exists() {
                return Err(StoreError::DeleteConflict {
                    model: model.to_string(),
                    uid,
                });
            }
            fs::rename(&live, &copy)?;
        } else {
            fs::remove_file(&live)?;
        }
        info!(
            "event=record_delete module=repo status=ok store=json model={model} uid={uid} soft={soft}"
        );
        Ok(())
    }

    fn restore(&self, model: &str, uid: u64) -> StoreResult<()> {
        let live = self.record_path(model, uid, false);
        let copy = self.record_path(model, uid, true);
        if live.exists() {
            return Err(StoreError::RestoreConflict {
                model: model.to_string(),
                uid,
            });
        }
        if !copy.is_file() {
            return Err(StoreError::Missing {
                model: model.to_string(),
                uid,
            });
        }
        fs::rename(&copy, &live)?;
        info!("event=record_restore module=repo status=ok store=json model={model} uid={uid}");
        Ok(())
    }

    fn list_all(&self, model: &str, include_soft_deleted: bool) -> StoreResult<Vec<u64>> {
        let dir = self.model_dir(model);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut uids = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Some(captures) = RECORD_STEM_RE.captures(stem) else {
                continue;
            };
            let soft = !captures[1].is_empty();
            if soft && !include_soft_deleted {
                continue;
            }
            if let Ok(uid) = captures[2].parse::<u64>() {
                uids.insert(uid);
            }
        }
        Ok(uids.into_iter().collect())
    }

    fn max_uid(&self, model: &str) -> StoreResult<u64> {
        Ok(self
            .list_all(model, true)?
            .last()
            .copied()
            .unwrap_or(0))
    }
}
