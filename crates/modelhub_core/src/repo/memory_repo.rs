//! In-process record store, used by tests and ephemeral registries.

use super::record_repo::{body_of, record_uid, with_uid, Record, RecordStore, StoreError, StoreResult};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct Table {
    live: BTreeMap<u64, Record>,
    soft: BTreeMap<u64, Record>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<BTreeMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, model: &str, f: impl FnOnce(&mut Table) -> T) -> T {
        let mut tables = self.tables.borrow_mut();
        f(tables.entry(model.to_string()).or_default())
    }
}

fn missing(model: &str, uid: u64) -> StoreError {
    StoreError::Missing {
        model: model.to_string(),
        uid,
    }
}

impl RecordStore for MemoryStore {
    fn exists(&self, model: &str, uid: u64, soft: bool) -> StoreResult<bool> {
        Ok(self.with_table(model, |table| {
            if soft {
                table.soft.contains_key(&uid)
            } else {
                table.live.contains_key(&uid)
            }
        }))
    }

    fn create(&self, model: &str, record: &Record) -> StoreResult<()> {
        let uid = record_uid(record)?;
        self.with_table(model, |table| {
            if table.live.contains_key(&uid) {
                return Err(StoreError::AlreadyExists {
                    model: model.to_string(),
                    uid,
                });
            }
            table.live.insert(uid, body_of(record));
            Ok(())
        })
    }

    fn read(&self, model: &str, uid: u64) -> StoreResult<Record> {
        self.with_table(model, |table| {
            table
                .live
                .get(&uid)
                .cloned()
                .map(|body| with_uid(body, uid))
                .ok_or_else(|| missing(model, uid))
        })
    }

    fn update(&self, model: &str, record: &Record) -> StoreResult<()> {
        let uid = record_uid(record)?;
        self.with_table(model, |table| {
            let slot = table.live.get_mut(&uid).ok_or_else(|| missing(model, uid))?;
            *slot = body_of(record);
            Ok(())
        })
    }

    fn delete(&self, model: &str, uid: u64, soft: bool) -> StoreResult<()> {
        self.with_table(model, |table| {
            if !table.live.contains_key(&uid) {
                return Err(missing(model, uid));
            }
            if soft && table.soft.contains_key(&uid) {
                return Err(StoreError::DeleteConflict {
                    model: model.to_string(),
                    uid,
                });
            }
            if let Some(body) = table.live.remove(&uid) {
                if soft {
                    table.soft.insert(uid, body);
                }
            }
            Ok(())
        })
    }

    fn restore(&self, model: &str, uid: u64) -> StoreResult<()> {
        self.with_table(model, |table| {
            if table.live.contains_key(&uid) {
                return Err(StoreError::RestoreConflict {
                    model: model.to_string(),
                    uid,
                });
            }
            let body = table.soft.remove(&uid).ok_or_else(|| missing(model, uid))?;
            table.live.insert(uid, body);
            Ok(())
        })
    }

    fn list_all(&self, model: &str, include_soft_deleted: bool) -> StoreResult<Vec<u64>> {
        Ok(self.with_table(model, |table| {
            let mut uids: BTreeSet<u64> = table.live.keys().copied().collect();
            if include_soft_deleted {
                uids.extend(table.soft.keys().copied());
            }
            uids.into_iter().collect()
        }))
    }

    fn max_uid(&self, model: &str) -> StoreResult<u64> {
        Ok(self.with_table(model, |table| {
            let live = table.live.keys().next_back().copied().unwrap_or(0);
            let soft = table.soft.keys().next_back().copied().unwrap_or(0);
            live.max(soft)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::repo::{RecordStore, StoreError};
    use serde_json::json;

    fn record(uid: u64, title: &str) -> crate::repo::Record {
        json!({"uid": uid, "title": title})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn soft_delete_then_restore_round_trip() {
        let store = MemoryStore::new();
        store.create("Book", &record(1, "Dune")).unwrap();
        store.delete("Book", 1, true).unwrap();

        assert!(!store.exists("Book", 1, false).unwrap());
        assert!(store.exists("Book", 1, true).unwrap());
        assert!(matches!(store.read("Book", 1), Err(StoreError::Missing { .. })));
        assert_eq!(store.list_all("Book", false).unwrap(), Vec::<u64>::new());
        assert_eq!(store.list_all("Book", true).unwrap(), vec![1]);
        assert_eq!(store.max_uid("Book").unwrap(), 1);

        store.restore("Book", 1).unwrap();
        assert_eq!(store.read("Book", 1).unwrap(), record(1, "Dune"));
    }

    #[test]
    fn conflicting_writes_are_rejected() {
        let store = MemoryStore::new();
        store.create("Book", &record(1, "Dune")).unwrap();
        assert!(matches!(
            store.create("Book", &record(1, "Emma")),
            Err(StoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            store.restore("Book", 1),
            Err(StoreError::RestoreConflict { .. })
        ));
        assert!(matches!(
            store.update("Book", &record(2, "Emma")),
            Err(StoreError::Missing { .. })
        ));
    }
}
