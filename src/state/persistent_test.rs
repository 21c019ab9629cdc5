use super::*;
use crate::state::storage::MemoryStorage;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Prefs {
    volume: u8,
    muted: bool,
}

fn factory(ctx: ExecutionContext) -> (Arc<MemoryStorage>, StoreFactory) {
    let storage = Arc::new(MemoryStorage::new());
    let factory = StoreFactory::new(ctx, storage.clone());
    (storage, factory)
}

fn interactive() -> ExecutionContext {
    ExecutionContext::interactive("localhost")
}

// =============================================================
// Before activation
// =============================================================

#[test]
fn make_store_starts_with_initial_value() {
    let (storage, factory) = factory(interactive());
    let store = factory.make_store("prefs", Prefs { volume: 5, muted: false });
    assert_eq!(store.key(), "prefs");
    assert_eq!(store.get(), Prefs { volume: 5, muted: false });
    assert!(!store.is_persistent());
    assert!(storage.is_empty());
}

#[test]
fn changes_before_activation_are_not_mirrored() {
    let (storage, factory) = factory(interactive());
    let store = factory.make_store("count", 0_u32);
    store.set(3);
    assert!(storage.get_item("count").unwrap().is_none());
}

// =============================================================
// Activation
// =============================================================

#[test]
fn activation_hydrates_from_slot() {
    let (storage, factory) = factory(interactive());
    storage.set_item("prefs", r#"{"volume":9,"muted":true}"#).unwrap();

    let store = factory.make_store("prefs", Prefs { volume: 5, muted: false });
    assert!(store.use_local_storage());
    assert_eq!(store.get(), Prefs { volume: 9, muted: true });
}

#[test]
fn activation_mirrors_subsequent_changes() {
    let (storage, factory) = factory(interactive());
    let store = factory.make_store("count", 1_u32);
    store.use_local_storage();

    // Current value is written on activation.
    assert_eq!(storage.get_item("count").unwrap().as_deref(), Some("1"));

    store.set(2);
    assert_eq!(storage.get_item("count").unwrap().as_deref(), Some("2"));
    store.update(|n| n + 40);
    assert_eq!(storage.get_item("count").unwrap().as_deref(), Some("42"));
}

#[test]
fn malformed_slot_falls_back_to_initial() {
    let (storage, factory) = factory(interactive());
    storage.set_item("prefs", "{not json").unwrap();

    let store = factory.make_store("prefs", Prefs { volume: 5, muted: false });
    assert!(store.use_local_storage());
    assert_eq!(store.get(), Prefs { volume: 5, muted: false });
    assert_eq!(storage.get_item("prefs").unwrap().as_deref(), Some(r#"{"volume":5,"muted":false}"#));
}

#[test]
fn empty_slot_is_treated_as_absent() {
    let (storage, factory) = factory(interactive());
    storage.set_item("name", "").unwrap();

    let store = factory.make_store("name", "initial".to_owned());
    store.use_local_storage();
    assert_eq!(store.get(), "initial");
}

#[test]
fn activation_without_persistent_storage_is_noop() {
    let (storage, factory) = factory(ExecutionContext::headless());
    storage.set_item("count", "9").unwrap();

    let store = factory.make_store("count", 1_u32);
    assert!(!store.use_local_storage());
    assert_eq!(store.get(), 1);

    store.set(2);
    assert_eq!(storage.get_item("count").unwrap().as_deref(), Some("9"));
}

#[test]
fn activation_is_idempotent() {
    let (_storage, factory) = factory(interactive());
    let store = factory.make_store("count", 1_u32);
    assert!(store.use_local_storage());
    assert!(!store.clone().use_local_storage());
    assert!(store.is_persistent());
    assert_eq!(store.store.listener_count(), 1);
}

#[test]
fn rehydration_round_trip() {
    let (storage, factory) = factory(interactive());
    let first = factory.make_store("prefs", Prefs { volume: 1, muted: false });
    first.use_local_storage();
    first.set(Prefs { volume: 7, muted: true });

    let second = StoreFactory::new(interactive(), storage).make_store("prefs", Prefs { volume: 1, muted: false });
    second.use_local_storage();
    assert_eq!(second.get(), Prefs { volume: 7, muted: true });
}
