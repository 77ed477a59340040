use mercato_core::{EventBus, FileStore, MemoryStore, MercatoError, PersistentStore};

#[test]
fn memory_store_basic_ops() {
    let store = MemoryStore::new();
    assert!(store.get("a").unwrap().is_none());

    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

    let mut keys = store.keys().unwrap();
    keys.sort();
    assert_eq!(keys, ["a", "b"]);

    store.remove("a").unwrap();
    store.remove("missing").unwrap();
    assert!(store.get("a").unwrap().is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn bounded_memory_store_rejects_oversized_writes() {
    let store = MemoryStore::with_capacity(8);
    store.set("k", "1234").unwrap();

    let err = store.set("other", "123456").expect_err("over capacity");
    assert!(matches!(err, MercatoError::Storage(_)));
    assert!(store.get("other").unwrap().is_none());

    // overwriting an existing key only counts the new value
    store.set("k", "1234567").unwrap();
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.json");

    {
        let store = FileStore::open(&path).unwrap();
        store.set("cache_AAPL", r#"{"value":1}"#).unwrap();
        store.set("cache_MSFT", r#"{"value":2}"#).unwrap();
        store.remove("cache_MSFT").unwrap();
    }

    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(
        reopened.get("cache_AAPL").unwrap().as_deref(),
        Some(r#"{"value":1}"#)
    );
    assert!(reopened.get("cache_MSFT").unwrap().is_none());
    assert_eq!(reopened.keys().unwrap(), ["cache_AAPL"]);
}

#[test]
fn file_store_rejects_corrupt_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, "not json").unwrap();

    assert!(matches!(FileStore::open(&path), Err(MercatoError::Storage(_))));
}

#[tokio::test]
async fn event_bus_fans_out_to_every_subscriber() {
    let bus: EventBus<u32> = EventBus::default();
    assert_eq!(bus.publish(1), 0, "no subscribers yet");

    let mut a = bus.subscribe();
    let mut b = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);
    assert_eq!(bus.publish(7), 2);

    assert_eq!(a.recv().await.unwrap(), 7);
    assert_eq!(b.recv().await.unwrap(), 7);
}
