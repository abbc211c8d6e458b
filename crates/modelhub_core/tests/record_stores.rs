use modelhub_core::repo::Record;
use modelhub_core::{JsonFileStore, MemoryStore, RecordStore, RuntimeConfig, SqliteStore, StoreError};
use serde_json::json;
use std::fs;

fn record(uid: u64, title: &str) -> Record {
    match json!({"uid": uid, "title": title}) {
        serde_json::Value::Object(object) => object,
        _ => unreachable!(),
    }
}

fn exercise_contract(store: &dyn RecordStore) {
    store.create("Book", &record(1, "Dune")).unwrap();
    store.create("Book", &record(2, "Emma")).unwrap();
    assert!(matches!(
        store.create("Book", &record(1, "Dup")),
        Err(StoreError::AlreadyExists { uid: 1, .. })
    ));

    store.save("Book", &record(1, "Dune Messiah")).unwrap();
    assert_eq!(store.read("Book", 1).unwrap(), record(1, "Dune Messiah"));
    assert!(store.read("Book", 9).unwrap_err().is_missing());
    assert!(matches!(
        store.update("Book", &record(9, "Ghost")),
        Err(StoreError::Missing { .. })
    ));

    store.delete("Book", 2, true).unwrap();
    assert!(!store.exists("Book", 2, false).unwrap());
    assert!(store.exists("Book", 2, true).unwrap());
    assert!(store.read("Book", 2).unwrap_err().is_missing());
    assert_eq!(store.list_all("Book", false).unwrap(), vec![1]);
    assert_eq!(store.list_all("Book", true).unwrap(), vec![1, 2]);
    assert_eq!(store.max_uid("Book").unwrap(), 2);

    // A live record recreated under the same uid blocks the restore.
    store.create("Book", &record(2, "Persuasion")).unwrap();
    assert!(matches!(
        store.restore("Book", 2),
        Err(StoreError::RestoreConflict { .. })
    ));
    assert!(matches!(
        store.delete("Book", 2, true),
        Err(StoreError::DeleteConflict { .. })
    ));
    store.delete("Book", 2, false).unwrap();
    store.restore("Book", 2).unwrap();
    assert_eq!(store.read("Book", 2).unwrap(), record(2, "Emma"));

    store.delete("Book", 1, false).unwrap();
    assert!(!store.exists("Book", 1, false).unwrap());
    assert!(!store.exists("Book", 1, true).unwrap());
    assert!(store.restore("Book", 1).unwrap_err().is_missing());

    assert!(store.list_all("Author", true).unwrap().is_empty());
    assert_eq!(store.max_uid("Author").unwrap(), 0);
}

#[test]
fn memory_store_honors_the_contract() {
    exercise_contract(&MemoryStore::new());
}

#[test]
fn json_store_honors_the_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise_contract(&JsonFileStore::open(dir.path()).unwrap());
}

#[test]
fn sqlite_store_honors_the_contract() {
    exercise_contract(&SqliteStore::in_memory().unwrap());
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modelhub.sqlite3");
    {
        let store = SqliteStore::open(&path).unwrap();
        store.create("Book", &record(4, "Dune")).unwrap();
        store.delete("Book", 4, true).unwrap();
    }
    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.max_uid("Book").unwrap(), 4);
    store.restore("Book", 4).unwrap();
    assert_eq!(store.read("Book", 4).unwrap(), record(4, "Dune"));
}

#[test]
fn json_files_hold_bodies_without_uid() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path()).unwrap();
    store.create("Book", &record(3, "Dune")).unwrap();

    let text = fs::read_to_string(dir.path().join("Book").join("3.json")).unwrap();
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body, json!({"title": "Dune"}));

    store.delete("Book", 3, true).unwrap();
    assert!(dir.path().join("Book").join("-3.json").is_file());
    assert!(!dir.path().join("Book").join("3.json").exists());

    // Stray files do not count as records.
    fs::write(dir.path().join("Book").join("notes.txt"), "x").unwrap();
    fs::write(dir.path().join("Book").join("draft.json"), "{}").unwrap();
    assert_eq!(store.list_all("Book", true).unwrap(), vec![3]);
}

#[test]
fn json_backup_copies_the_whole_tree() {
    let data = tempfile::tempdir().unwrap();
    let backups = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(data.path()).unwrap();
    store.create("Book", &record(1, "Dune")).unwrap();
    store.create("Author", &record(1, "Frank")).unwrap();
    store.delete("Author", 1, true).unwrap();

    let target = store.backup(backups.path()).unwrap();
    assert!(target
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("db_")));
    assert!(target.join("Book").join("1.json").is_file());
    assert!(target.join("Author").join("-1.json").is_file());

    let copy = JsonFileStore::open(&target).unwrap();
    assert_eq!(copy.read("Book", 1).unwrap(), record(1, "Dune"));
}

#[test]
fn stores_open_from_runtime_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::from_json_str(
        &serde_json::json!({
            "database_path": dir.path().join("db"),
            "backup_dir": dir.path().join("backups"),
        })
        .to_string(),
    )
    .unwrap();

    let json_store = JsonFileStore::from_config(&config).unwrap();
    assert_eq!(json_store.root(), config.database_path.as_path());
    json_store.create("Book", &record(1, "Dune")).unwrap();
    let target = json_store.backup(&config.backup_dir).unwrap();
    assert!(target.starts_with(&config.backup_dir));

    let sqlite_store = SqliteStore::from_config(&config).unwrap();
    sqlite_store.create("Book", &record(1, "Dune")).unwrap();
    assert_eq!(sqlite_store.list_all("Book", false).unwrap(), vec![1]);
}
