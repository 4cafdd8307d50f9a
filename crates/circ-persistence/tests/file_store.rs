//! File-backed state store: round trip, reopen and atomic rewrite.

use circ_core::{StateStore, StoredState};
use circ_persistence::FileStateStore;

fn temp_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("circ-store-{}.json", uuid::Uuid::new_v4()))
}

#[test]
fn put_get_delete_round_trip() {
    let path = temp_path();
    let mut store = FileStateStore::open(&path).unwrap();
    assert!(store.is_empty());

    store.put("pump", b"{\"state\":\"on\"}").unwrap();
    let StoredState { payload, saved_at } = store.get("pump").unwrap().unwrap();
    assert_eq!(payload, b"{\"state\":\"on\"}");
    assert!(saved_at <= chrono::Utc::now());

    store.delete("pump").unwrap();
    assert!(store.get("pump").unwrap().is_none());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn records_survive_a_reopen() {
    let path = temp_path();
    {
        let mut store = FileStateStore::open(&path).unwrap();
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
    }
    let store = FileStateStore::open(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("a").unwrap().unwrap().payload, b"1");
    assert_eq!(store.get("b").unwrap().unwrap().payload, b"2");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_file_means_an_empty_store() {
    let path = temp_path();
    let store = FileStateStore::open(&path).unwrap();
    assert!(store.is_empty());
    assert!(store.get("anything").unwrap().is_none());
}

#[test]
fn overwrite_replaces_the_payload() {
    let path = temp_path();
    let mut store = FileStateStore::open(&path).unwrap();
    store.put("k", b"old").unwrap();
    store.put("k", b"new").unwrap();
    assert_eq!(store.get("k").unwrap().unwrap().payload, b"new");
    assert_eq!(store.len(), 1);
    let _ = std::fs::remove_file(&path);
}
