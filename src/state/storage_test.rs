use super::*;

fn temp_path() -> PathBuf {
    std::env::temp_dir().join(format!("vidpair-storage-{}", uuid::Uuid::new_v4())).join("slots.json")
}

// =============================================================
// MemoryStorage
// =============================================================

#[test]
fn memory_set_get_remove() {
    let storage = MemoryStorage::new();
    assert!(storage.get_item("k").unwrap().is_none());

    storage.set_item("k", "\"v\"").unwrap();
    assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("\"v\""));
    assert_eq!(storage.len(), 1);

    storage.remove_item("k").unwrap();
    assert!(storage.is_empty());
}

#[test]
fn memory_remove_missing_is_ok() {
    let storage = MemoryStorage::new();
    assert!(storage.remove_item("missing").is_ok());
}

// =============================================================
// FileStorage
// =============================================================

#[test]
fn file_missing_opens_empty() {
    let storage = FileStorage::open(temp_path()).unwrap();
    assert!(storage.get_item("user").unwrap().is_none());
    assert!(!storage.path().exists());
}

#[test]
fn file_writes_survive_reopen() {
    let path = temp_path();
    {
        let storage = FileStorage::open(&path).unwrap();
        storage.set_item("user", r#"{"email":"a@b.c"}"#).unwrap();
        storage.set_item("prefs", "[1,2]").unwrap();
        storage.remove_item("prefs").unwrap();
    }

    let reopened = FileStorage::open(&path).unwrap();
    assert_eq!(reopened.get_item("user").unwrap().as_deref(), Some(r#"{"email":"a@b.c"}"#));
    assert!(reopened.get_item("prefs").unwrap().is_none());

    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn file_corrupt_is_an_error() {
    let path = temp_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();

    let err = FileStorage::open(&path).unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }));

    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn file_blank_opens_empty() {
    let path = temp_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "  \n").unwrap();

    let storage = FileStorage::open(&path).unwrap();
    assert!(storage.get_item("user").unwrap().is_none());

    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}
